//! Deterministic keyword responder used whenever the generative-text path
//! is unavailable. Pure: no I/O, no state, never fails.

use serde::{Deserialize, Serialize};

/// Text and optional suggestion buttons for one reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineReply {
    pub text: String,
    pub buttons: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Greeting,
    WasteSegregation,
    Toilets,
    EWaste,
    Composting,
    PlasticBan,
    Report,
    WaterSupply,
    Thanks,
    About,
}

/// The suggestion buttons offered with the welcome, greeting and menu
/// replies. Each label routes back to its own topic.
pub const TOPIC_BUTTONS: [&str; 8] = [
    "Waste Segregation",
    "Public Toilets",
    "E-Waste",
    "Composting",
    "Plastic Ban",
    "Report an Issue",
    "Water Supply",
    "About",
];

pub const WELCOME_TEXT: &str = "Vanakkam! I'm the civic helpdesk assistant. \
Ask me about waste segregation, public toilets, e-waste, composting, the plastic ban, \
water supply, or how to report an issue in your area.";

const GREETING_TEXT: &str = "Vanakkam! How can I help you today? \
Pick a topic below or type your question.";

const MENU_TEXT: &str = "I'm not sure I understood that. \
Here are the things I can help with:";

/// Topics in match priority order. Keywords are whole words, `stem*`
/// prefixes, or space-separated phrases.
const RULES: &[(Topic, &[&str])] = &[
    (
        Topic::Greeting,
        &["hi", "hii", "hello", "hey", "vanakkam", "namaste", "good morning", "good evening"],
    ),
    (
        Topic::WasteSegregation,
        &[
            "segregat*", "separate", "sorting", "wet waste", "dry waste", "garbage",
            "trash", "dustbin*", "bin", "bins",
        ],
    ),
    (
        Topic::Toilets,
        &["toilet*", "restroom*", "washroom*", "urinal*", "lavator*", "sanitation"],
    ),
    (
        Topic::EWaste,
        &["e-waste", "ewaste", "electronic*", "batter*", "gadget*", "laptop*", "phone*"],
    ),
    (Topic::Composting, &["compost*", "manure", "organic"]),
    (
        Topic::PlasticBan,
        &["plastic*", "polythene", "carry bag*", "single-use", "single use"],
    ),
    (
        Topic::Report,
        &["report*", "complain*", "issue*", "problem*", "pothole*", "streetlight*", "grievance*"],
    ),
    (
        Topic::WaterSupply,
        &["water", "tap", "pipeline*", "leak*", "tanker*", "supply"],
    ),
    (Topic::Thanks, &["thanks", "thank*", "thx", "nandri"]),
    (Topic::About, &["about", "who are you", "what is this", "what can you do", "help"]),
];

impl Topic {
    fn reply(&self) -> OfflineReply {
        let text = match self {
            Topic::Greeting => GREETING_TEXT,
            Topic::WasteSegregation => {
                "Please keep waste in separate bins: green for wet waste (food scraps, \
                 peels, garden waste), blue for dry waste (paper, plastic, metal, glass) \
                 and a separate bag for sanitary and hazardous waste. Hand it over to \
                 the door-to-door collection staff on your street's schedule."
            }
            Topic::Toilets => {
                "Public toilets are marked on the map screen of this portal. Most are \
                 open from 6 AM to 10 PM and are free to use. If a toilet is locked, \
                 dirty or out of water, please report it so the ward team can act on it."
            }
            Topic::EWaste => {
                "Old phones, chargers, batteries and other electronics must not go into \
                 household bins. Drop them at an authorised e-waste collection centre or \
                 wait for the monthly e-waste collection drive in your zone."
            }
            Topic::Composting => {
                "Home composting is easy: layer kitchen scraps with dry leaves in a \
                 ventilated bin, keep it moist but not wet, and turn it weekly. You \
                 will have usable compost in 6 to 8 weeks."
            }
            Topic::PlasticBan => {
                "Single-use plastics such as carry bags, plastic cups, straws and \
                 thermocol plates are banned. Carry a cloth bag and a steel bottle. \
                 Shops selling banned items can be reported through the portal."
            }
            Topic::Report => {
                "To report an issue, open the Report screen, add a photo, pick the \
                 category and confirm your location. You can track the status of your \
                 complaint from your dashboard."
            }
            Topic::WaterSupply => {
                "For water supply problems such as no supply, low pressure or a leaking \
                 pipeline, report it with your street name and landmark. Tanker supply \
                 can be requested through your area's ward office."
            }
            Topic::Thanks => "You're welcome! Together we can keep our city clean.",
            Topic::About => {
                "I'm the civic helpdesk assistant for this portal. I can answer \
                 questions about waste management, sanitation and water supply, \
                 and help you report issues in your neighbourhood."
            }
        };

        let buttons = match self {
            Topic::Greeting | Topic::About => Some(topic_buttons()),
            Topic::Toilets | Topic::WaterSupply => Some(vec!["Report an Issue".to_string()]),
            _ => None,
        };

        OfflineReply {
            text: text.to_string(),
            buttons,
        }
    }
}

pub fn topic_buttons() -> Vec<String> {
    TOPIC_BUTTONS.iter().map(|b| b.to_string()).collect()
}

/// First topic whose keywords appear in `input`, if any.
pub fn match_topic(input: &str) -> Option<Topic> {
    let lowered = input.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .collect();
    let joined = format!(" {} ", words.join(" "));

    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| keyword_matches(k, &words, &joined)))
        .map(|(topic, _)| *topic)
}

fn keyword_matches(keyword: &str, words: &[&str], joined: &str) -> bool {
    if keyword.contains(' ') {
        // Phrase: match on word boundaries in the normalised text.
        return joined.contains(&format!(" {} ", keyword));
    }
    match keyword.strip_suffix('*') {
        Some(stem) => words.iter().any(|w| w.starts_with(stem)),
        None => words.iter().any(|w| *w == keyword),
    }
}

/// Answer `input` without the network.
pub fn respond(input: &str) -> OfflineReply {
    match match_topic(input) {
        Some(topic) => topic.reply(),
        None => OfflineReply {
            text: MENU_TEXT.to_string(),
            buttons: Some(topic_buttons()),
        },
    }
}
