/// Match record parsing: JSON array or one `home,away,home_count,away_count`
/// record per line.
///
/// Blank lines and `#` comments are skipped in the line format. A first line
/// whose count columns are not numbers is treated as a header.
use scoreline_core::MatchInput;

pub fn parse_matches(content: &str) -> Result<Vec<MatchInput>, String> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| format!("Input looks like JSON but failed to parse: {e}"))
    } else {
        parse_lines(trimmed)
    }
}

/// Parse a `HOME,AWAY` fixture given on the command line.
pub fn parse_fixture(arg: &str) -> Result<(String, String), String> {
    match arg.split_once(',') {
        Some((home, away)) if !home.trim().is_empty() && !away.trim().is_empty() => {
            Ok((home.trim().to_string(), away.trim().to_string()))
        }
        _ => Err(format!("Fixture \"{arg}\" must be HOME,AWAY")),
    }
}

fn parse_lines(content: &str) -> Result<Vec<MatchInput>, String> {
    let mut matches = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(format!(
                "line {}: expected home,away,home_count,away_count, got {} fields",
                lineno + 1,
                fields.len()
            ));
        }
        let counts = (fields[2].parse::<u32>(), fields[3].parse::<u32>());
        match counts {
            (Ok(home_count), Ok(away_count)) => matches.push(MatchInput {
                home: fields[0].to_string(),
                away: fields[1].to_string(),
                home_count,
                away_count,
            }),
            // Header row
            _ if matches.is_empty() && lineno == first_content_line(content) => continue,
            _ => {
                return Err(format!(
                    "line {}: counts must be non-negative integers, got \"{}\" and \"{}\"",
                    lineno + 1,
                    fields[2],
                    fields[3]
                ))
            }
        }
    }
    Ok(matches)
}

fn first_content_line(content: &str) -> usize {
    content
        .lines()
        .position(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .unwrap_or(0)
}
