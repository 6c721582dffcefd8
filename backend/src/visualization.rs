//! Chart objects embedded in assistant answers

use shared::{ContentBlock, Visualization};
use tracing::debug;

use crate::extract::normalize_js_object;

/// Parse the first text block that holds a `{ title, insight, data }` chart.
///
/// Answers that are not charts, or charts without points, yield `None`.
pub fn parse_visualization(content: &[ContentBlock]) -> Option<Visualization> {
    content
        .iter()
        .filter_map(ContentBlock::as_text)
        .find_map(parse_chart_text)
}

fn parse_chart_text(text: &str) -> Option<Visualization> {
    let body = strip_fence(text.trim());
    if !body.starts_with('{') || !body.contains("data") {
        return None;
    }

    match serde_json::from_str::<Visualization>(&normalize_js_object(body)) {
        Ok(chart) if !chart.data.is_empty() => Some(chart),
        Ok(_) => None,
        Err(e) => {
            debug!("Answer looks like a chart but did not parse: {}", e);
            None
        }
    }
}

/// Body of a single fenced block, or the text unchanged
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // drop the language tag line
    match rest.find('\n') {
        Some(newline) => rest[newline + 1..].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Visualization> {
        parse_visualization(&[ContentBlock::text(text)])
    }

    #[test]
    fn test_js_style_chart() {
        let chart = parse(
            "{ title: 'Sales by year', insight: \"Growing\", data: [{label: 2022, value: 10}, {label: '2023', value: 12.5},] }",
        )
        .unwrap();

        assert_eq!(chart.title.as_deref(), Some("Sales by year"));
        assert_eq!(chart.insight.as_deref(), Some("Growing"));
        assert_eq!(chart.data.len(), 2);
        assert_eq!(chart.data[0].label, "2022");
        assert_eq!(chart.data[1].value, 12.5);
    }

    #[test]
    fn test_fenced_chart() {
        let chart = parse("```json\n{\"data\": [{\"label\": \"a\", \"value\": 1}]}\n```").unwrap();
        assert_eq!(chart.data[0].label, "a");
        assert!(chart.title.is_none());
    }

    #[test]
    fn test_prose_is_not_a_chart() {
        assert!(parse("The data shows 42 orders.").is_none());
        assert!(parse("{ broken: data").is_none());
        assert!(parse("{ title: 'empty', data: [] }").is_none());
    }

    #[test]
    fn test_first_chart_block_wins() {
        let content = vec![
            ContentBlock::text("Here is the chart:"),
            ContentBlock::text("{data: [{label: 'x', value: 3}]}"),
        ];
        assert_eq!(parse_visualization(&content).unwrap().data[0].value, 3.0);
    }
}
