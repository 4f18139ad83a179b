//! Prompt construction for the dashboard snapshot and simulation chat.
//!
//! Both prompts share [`SYSTEM_INSTRUCTION`]. These are pure functions of the
//! profile, the query and the transcript; they never reorder or drop turns.

use crate::generative::{GenerationRequest, Turn};
use crate::model::{ChatMessage, UserProfile};

/// Persona and response rules sent with every request.
pub const SYSTEM_INSTRUCTION: &str = r#"You are the Personal AQI Tracker, an AI assistant dedicated to monitoring, analyzing, predicting and advising on the Air Quality Index (AQI).
Your focus is raising awareness about hazardous air quality in India and its links to climate change.

Goals:
1. Raise awareness of AQI hazards, with an India focus.
2. Give preventive recommendations tailored to the user's habits and health.
3. Track exposure and predict trends using weather and climate data.
4. Run "what-if" simulations when asked.

Response rules:
- Be scientific but accessible.
- Point out climate change links where relevant (for example heatwaves raising ozone).
- Use metric units.
- Use Indian context: seasonal stubble burning, Diwali, winter inversions, monsoon washout."#;

/// Used in place of an empty health condition list.
const NO_CONDITIONS: &str = "none reported";

/// Schema the dashboard prompt asks for. Keep in sync with [`crate::model::DashboardData`].
const DASHBOARD_SCHEMA: &str = r#"{
  "current": {
    "aqi": integer,
    "pm25": number,
    "pm10": number,
    "temp": number,
    "humidity": number,
    "condition": string,
    "location": string,
    "timestamp": string
  },
  "forecast": [
    { "time": string, "aqi": integer }
  ],
  "healthRisk": string,
  "advisory": [string],
  "climateInsight": string
}"#;

/// Build the dashboard snapshot request for a profile.
pub fn dashboard_request(profile: &UserProfile) -> GenerationRequest {
    let conditions = if profile.health_conditions.is_empty() {
        NO_CONDITIONS.to_string()
    } else {
        profile.health_conditions.join(", ")
    };

    let prompt = format!(
        "Generate a realistic dashboard status for location: {city}.\n\
         User profile: Sensitivity: {sensitivity}, Health: {conditions}, Commute: {commute}.\n\
         \n\
         Use Google Search to fetch the real-time AQI and weather for this location.\n\
         Then estimate a 24 hour AQI forecast curve from current trends.\n\
         Give actionable advice specific to this user.\n\
         Include a climate insight relevant to the current season in India.\n\
         \n\
         IMPORTANT: Return exactly one strictly valid JSON object and nothing else. \
         Do not wrap it in markdown code blocks.\n\
         \"timestamp\" must be ISO 8601. \"aqi\" values must be whole numbers.\n\
         The JSON must match this structure:\n\
         {schema}",
        city = profile.city,
        sensitivity = profile.sensitivity.as_str(),
        conditions = conditions,
        commute = profile.commute_mode.as_str(),
        schema = DASHBOARD_SCHEMA,
    );

    GenerationRequest {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        contents: vec![Turn::user(prompt)],
        search_grounding: true,
    }
}

/// Build a simulation request.
///
/// `history` is the transcript before `query`, oldest first; every entry is
/// sent as its own turn ahead of the query.
pub fn simulation_request(
    profile: &UserProfile,
    query: &str,
    history: &[ChatMessage],
) -> GenerationRequest {
    let mut contents: Vec<Turn> = history
        .iter()
        .map(|m| Turn {
            role: m.role,
            text: m.text.clone(),
        })
        .collect();

    contents.push(Turn::user(format!(
        "User Context: {}, {} sensitivity.\nUser Query: {}",
        profile.city,
        profile.sensitivity.as_str(),
        query
    )));

    GenerationRequest {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        contents,
        search_grounding: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatRole, CommuteMode, Sensitivity};

    fn profile() -> UserProfile {
        UserProfile {
            name: "Meera".to_string(),
            city: "Lucknow".to_string(),
            sensitivity: Sensitivity::High,
            commute_mode: CommuteMode::PublicTransport,
            health_conditions: vec!["Asthma".to_string(), "COPD".to_string()],
        }
    }

    #[test]
    fn test_dashboard_request_embeds_profile() {
        let req = dashboard_request(&profile());

        assert_eq!(req.system_instruction, SYSTEM_INSTRUCTION);
        assert!(req.search_grounding);
        assert_eq!(req.contents.len(), 1);

        let text = &req.contents[0].text;
        assert!(text.contains("location: Lucknow"));
        assert!(text.contains("Sensitivity: high"));
        assert!(text.contains("Health: Asthma, COPD"));
        assert!(text.contains("Commute: public_transport"));
        assert!(text.contains("Do not wrap it in markdown"));
        assert!(text.contains("\"climateInsight\": string"));
    }

    #[test]
    fn test_dashboard_request_without_conditions() {
        let mut p = profile();
        p.health_conditions.clear();

        let req = dashboard_request(&p);

        assert!(req.contents[0].text.contains("Health: none reported"));
    }

    #[test]
    fn test_simulation_request_keeps_history_order() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::simulation_reply("second"),
            ChatMessage::user("third"),
            ChatMessage::local_reply("fourth"),
        ];

        let req = simulation_request(&profile(), "What if it rains?", &history);

        let texts: Vec<&str> = req.contents.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(&texts[..4], &["first", "second", "third", "fourth"]);
        assert_eq!(req.contents[1].role, ChatRole::Model);

        let last = req.contents.last().unwrap();
        assert_eq!(last.role, ChatRole::User);
        assert_eq!(
            last.text,
            "User Context: Lucknow, high sensitivity.\nUser Query: What if it rains?"
        );
    }

    #[test]
    fn test_simulation_request_without_history() {
        let req = simulation_request(&profile(), "Is it safe to cycle?", &[]);

        assert_eq!(req.contents.len(), 1);
        assert!(req.search_grounding);
    }
}
