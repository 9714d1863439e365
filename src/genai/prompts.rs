//! Prompt text and response clean-up for the suggestion endpoints
//! 建议接口的提示词与响应清洗

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCENE_DESCRIPTION_PROMPT: &str = "Describe the scene in this image in detail, focusing on objects, environment, and potential activities.";

pub const SCENE_DESCRIPTION_FALLBACK: &str = "Could not generate a detailed scene description.";

pub fn detection_targets(camera_scene_context: &str, scene_description: Option<&str>) -> String {
    let description = scene_description
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A");
    format!(
        "Given the following context about a camera scene ({camera_scene_context}) and its description ({description}), suggest a comma-separated list of relevant physical objects, people, or vehicles that an AI detection system should focus on detecting.\n\n\
         Suggest a concise comma-separated list of detection targets (e.g., \"Person, Vehicle, Package, Animal\"). Provide only the comma-separated list in your response, with no other text or formatting.\n"
    )
}

pub fn alert_events(camera_scene_context: &str, ai_detection_target: &str) -> String {
    format!(
        "Based on the following camera scene context: \"{camera_scene_context}\" and AI detection targets: \"{ai_detection_target}\", suggest a list of relevant alert events. Each alert event should have a clear 'name' (a short title) and a 'condition' (a brief description of what triggers the alert, e.g., \"when a person enters the red zone\" or \"if a vehicle stops in the driveway for more than 5 minutes\").\n\n\
         Provide the suggestions as a JSON array of objects, where each object MUST have a 'name' (string) and a 'condition' (string). Ensure the response is valid JSON, and include only the JSON array.\n\n\
         Example format:\n\
         [\n  \
         {{ \"name\": \"Motion in Zone 1\", \"condition\": \"any motion detected in the designated zone\" }},\n  \
         {{ \"name\": \"Package Drop-off\", \"condition\": \"a static object appears near the front door\" }},\n  \
         {{ \"name\": \"Vehicle Entering\", \"condition\": \"a vehicle crosses the property line\" }}\n\
         ]\n"
    )
}

/// Drop quote characters the model likes to add / 去除模型附加的引号
pub fn clean_targets(raw: &str) -> String {
    raw.trim().replace(['"', '\''], "")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub name: String,
    pub condition: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AlertParseError {
    NotJson,
    WrongShape,
}

impl AlertParseError {
    pub fn message(&self) -> &'static str {
        match self {
            AlertParseError::NotJson => "AI model did not return valid JSON for alert events.",
            AlertParseError::WrongShape => {
                "AI model did not return the expected JSON format for alert events."
            }
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Optional language tag on the opening fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's JSON array of `{name, condition}` objects
/// 解析模型返回的`{name, condition}`对象数组
pub fn parse_alert_events(raw: &str) -> Result<Vec<AlertEvent>, AlertParseError> {
    let value: Value =
        serde_json::from_str(strip_code_fence(raw)).map_err(|_| AlertParseError::NotJson)?;
    let items = value.as_array().ok_or(AlertParseError::WrongShape)?;
    items
        .iter()
        .map(|item| {
            let name = item.get("name").and_then(Value::as_str);
            let condition = item.get("condition").and_then(Value::as_str);
            match (name, condition) {
                (Some(n), Some(c)) => Ok(AlertEvent {
                    name: n.to_string(),
                    condition: c.to_string(),
                }),
                _ => Err(AlertParseError::WrongShape),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_prompt_defaults_description() {
        let p = detection_targets("loading dock", None);
        assert!(p.contains("(loading dock)"));
        assert!(p.contains("(N/A)"));
        let p = detection_targets("loading dock", Some("two trucks"));
        assert!(p.contains("(two trucks)"));
    }

    #[test]
    fn test_alert_prompt_braces() {
        let p = alert_events("lobby", "Person");
        assert!(p.contains("{ \"name\": \"Motion in Zone 1\""));
        assert!(p.contains("\"lobby\""));
    }

    #[test]
    fn test_clean_targets() {
        assert_eq!(clean_targets(" \"Person, 'Vehicle'\"\n"), "Person, Vehicle");
    }

    #[test]
    fn test_parse_alert_events() {
        let raw = r#"[{"name": "Loitering", "condition": "person stays > 5 min"}]"#;
        let events = parse_alert_events(raw).unwrap();
        assert_eq!(events[0].name, "Loitering");

        let fenced = "```json\n[{\"name\": \"A\", \"condition\": \"B\"}]\n```";
        assert_eq!(parse_alert_events(fenced).unwrap().len(), 1);

        assert_eq!(parse_alert_events("sure! here"), Err(AlertParseError::NotJson));
        assert_eq!(
            parse_alert_events(r#"{"name": "A"}"#),
            Err(AlertParseError::WrongShape)
        );
        assert_eq!(
            parse_alert_events(r#"[{"name": "A"}]"#),
            Err(AlertParseError::WrongShape)
        );
    }
}
