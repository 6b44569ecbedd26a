use rand::seq::SliceRandom;

/// One keyword rule. Any phrase matching as whole words fires the rule.
#[derive(Debug)]
struct Rule {
    name: &'static str,
    phrases: &'static [&'static str],
    response: &'static str,
    confidence: f32,
}

/// Ordered; the first matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        name: "greeting",
        phrases: &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
        response: "Hello! I'm running in offline mode right now, but I can still help with device questions.",
        confidence: 0.95,
    },
    Rule {
        name: "battery",
        phrases: &["battery", "charge", "charging", "power level"],
        response: "You can check your battery level and usage in the battery section of your device settings. \
                   Lowering screen brightness and closing background apps helps it last longer.",
        confidence: 0.9,
    },
    Rule {
        name: "memory",
        phrases: &["memory", "ram", "storage", "space"],
        response: "Memory usage is being watched continuously. Closing apps you are not using frees memory, \
                   and cached data is cleared automatically when pressure gets high.",
        confidence: 0.9,
    },
    Rule {
        name: "performance",
        phrases: &["performance", "slow", "lag", "laggy", "speed up", "faster", "optimize"],
        response: "Performance is tuned automatically based on memory, CPU, battery and temperature. \
                   Restarting heavy apps can also help if things feel slow.",
        confidence: 0.9,
    },
    Rule {
        name: "app_open",
        phrases: &["open", "launch", "start app", "run app"],
        response: "Tell me the name of the app and I'll try to open it for you.",
        confidence: 0.85,
    },
    Rule {
        name: "app_close",
        phrases: &["close", "quit", "exit app", "stop app", "kill"],
        response: "Tell me which app you want to close and I'll take care of it.",
        confidence: 0.85,
    },
    Rule {
        name: "time",
        phrases: &["time", "clock", "what hour"],
        response: "The current time is shown in your status bar. I can't look it up while offline.",
        confidence: 0.9,
    },
    Rule {
        name: "date",
        phrases: &["date", "day is it", "today", "calendar"],
        response: "Today's date is shown in your calendar and on the lock screen.",
        confidence: 0.9,
    },
    Rule {
        name: "weather",
        phrases: &["weather", "forecast", "rain", "temperature outside", "sunny"],
        response: "I need a network connection to get weather information. Please try again once you're online.",
        confidence: 0.9,
    },
    Rule {
        name: "help",
        phrases: &["help", "what can you do", "how do i", "assist"],
        response: "Offline, I can answer questions about battery, memory, performance, apps and settings. \
                   More capable answers come back once the network does.",
        confidence: 0.95,
    },
    Rule {
        name: "settings",
        phrases: &["settings", "setting", "preferences", "configure", "brightness", "volume"],
        response: "You can change that in your device settings. Let me know which setting you're looking for.",
        confidence: 0.85,
    },
    Rule {
        name: "network",
        phrases: &["network", "wifi", "wi-fi", "internet", "connection", "offline", "online", "signal"],
        response: "It looks like the network is unavailable or slow, so I'm answering locally. \
                   Check Wi-Fi or mobile data and try again.",
        confidence: 0.9,
    },
    Rule {
        name: "search",
        phrases: &["search", "look up", "find", "google"],
        response: "Searching needs a network connection. I can help again as soon as you're back online.",
        confidence: 0.85,
    },
    Rule {
        name: "gratitude",
        phrases: &["thanks", "thank you", "thx", "appreciate"],
        response: "You're welcome! Happy to help.",
        confidence: 0.95,
    },
    Rule {
        name: "goodbye",
        phrases: &["bye", "goodbye", "see you", "good night", "later"],
        response: "Goodbye! I'll be here when you need me.",
        confidence: 0.95,
    },
];

const CLARIFY_RESPONSE: &str = "Could you tell me a bit more about what you need?";
const CLARIFY_CONFIDENCE: f32 = 0.3;

const QUESTION_RESPONSE: &str = "I'm in offline mode, so I can only answer a limited set of questions \
    about your device right now. Try asking about battery, memory, performance or settings.";
const QUESTION_CONFIDENCE: f32 = 0.5;

const GENERIC_RESPONSES: &[&str] = &[
    "I'm working offline at the moment. Could you rephrase that, or ask about your device?",
    "I didn't quite catch that. I can help with battery, memory, apps and settings while offline.",
    "I'm not sure how to help with that offline. Try again once you're connected.",
    "Tell me more, or ask me about your device's battery, memory or performance.",
];
const GENERIC_CONFIDENCE: f32 = 0.4;

/// A reply picked by the rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleReply {
    pub text: String,
    pub confidence: f32,
    pub rule: &'static str,
}

impl RuleReply {
    fn new(rule: &'static str, text: &str, confidence: f32) -> Self {
        Self { text: text.to_owned(), confidence, rule }
    }
}

/// Answer `input` from the rule table. Deterministic except for the catch-all.
pub fn respond(input: &str) -> RuleReply {
    let lower = input.trim().to_lowercase();
    let words = split_words(&lower);

    if let Some(rule) = RULES.iter().find(|r| r.phrases.iter().any(|p| contains_phrase(&words, p))) {
        return RuleReply::new(rule.name, rule.response, rule.confidence);
    }

    if lower.chars().count() < 3 {
        return RuleReply::new("clarify", CLARIFY_RESPONSE, CLARIFY_CONFIDENCE);
    }

    if lower.contains('?') {
        return RuleReply::new("question", QUESTION_RESPONSE, QUESTION_CONFIDENCE);
    }

    let text = GENERIC_RESPONSES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(GENERIC_RESPONSES[0]);
    RuleReply::new("generic", text, GENERIC_CONFIDENCE)
}

fn split_words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word match of a (possibly multi-word) phrase.
fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}
