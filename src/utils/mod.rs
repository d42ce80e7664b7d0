use std::collections::BTreeMap;

/// Wires the log facade to stdout with timestamps.
pub fn init_logging(level: log::LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// Formats a second count as `m:ss` for the countdown and summary displays.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Percentage of answers matching the answer key, rounded.
pub fn calculate_score(
    answers: &BTreeMap<usize, String>,
    answer_key: &BTreeMap<usize, String>,
) -> u32 {
    if answer_key.is_empty() {
        return 0;
    }
    let correct = answers
        .iter()
        .filter(|(index, value)| answer_key.get(index) == Some(value))
        .count();
    ((correct as f64 / answer_key.len() as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(600), "10:00");
    }

    #[test]
    fn test_calculate_score() {
        let key = BTreeMap::from([
            (0, "A".to_string()),
            (1, "B".to_string()),
            (2, "C".to_string()),
        ]);
        let answers = BTreeMap::from([(0, "A".to_string()), (1, "D".to_string())]);

        assert_eq!(calculate_score(&answers, &key), 33);
        assert_eq!(calculate_score(&key, &key), 100);
        assert_eq!(calculate_score(&answers, &BTreeMap::new()), 0);
    }
}
