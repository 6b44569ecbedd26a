use std::collections::HashMap;

pub const PAD_ID: i64 = 0;
pub const UNK_ID: i64 = 1;
pub const START_ID: i64 = 2;
pub const END_ID: i64 = 3;

const SENTINELS: [&str; 4] = ["<pad>", "[UNK]", "<start>", "<end>"];

/// Default cap on vocabulary entries, sentinels included.
pub const DEFAULT_MAX_VOCAB: usize = 1000;

/// Common words first, then assistant-domain terms. Order fixes the ids.
const CURATED_WORDS: &[&str] = &[
    // common
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been",
    "i", "you", "he", "she", "it", "we", "they", "me", "my", "your", "our", "their",
    "this", "that", "these", "those", "what", "when", "where", "who", "why", "how",
    "can", "could", "will", "would", "should", "do", "does", "did", "have", "has",
    "not", "no", "yes", "ok", "okay", "please", "thanks", "thank", "sorry",
    "to", "of", "in", "on", "at", "for", "with", "from", "by", "about", "up", "down",
    "now", "today", "tomorrow", "yesterday", "here", "there", "some", "any", "all",
    "more", "less", "very", "too", "much", "many", "good", "bad", "new", "old",
    "hello", "hi", "hey", "bye", "goodbye", "world", "help", "need", "want", "like",
    "know", "tell", "show", "make", "get", "go", "see", "use", "find", "try",
    // device and assistant domain
    "battery", "charge", "charging", "power", "memory", "ram", "storage", "cpu",
    "performance", "slow", "fast", "speed", "optimize", "temperature", "hot", "heat",
    "network", "wifi", "internet", "connection", "offline", "online", "signal",
    "app", "apps", "open", "close", "launch", "start", "stop", "run", "running",
    "time", "date", "day", "clock", "weather", "rain", "sun", "forecast",
    "settings", "setting", "brightness", "volume", "sound", "screen", "display",
    "search", "look", "call", "message", "text", "email", "camera", "photo",
    "music", "play", "pause", "alarm", "timer", "reminder", "calendar",
    "level", "status", "usage", "free", "low", "high", "device", "phone", "system",
    "assistant", "question", "answer", "mode", "cache", "clear", "background",
];

const PUNCTUATION: &[char] = &['.', ',', '!', '?', '\'', '-', ':', ';', '(', ')', '"'];

/// Deterministic word-level vocabulary with character fallbacks.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, i64>,
}

impl Vocabulary {
    /// Build the vocabulary: sentinels, curated words, then single characters,
    /// stopping once `max_size` entries exist.
    pub fn build(max_size: usize) -> Self {
        let mut vocab = Self { tokens: Vec::new(), ids: HashMap::new() };

        let chars = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(PUNCTUATION.iter().copied())
            .map(String::from);

        let entries = SENTINELS
            .iter()
            .map(|s| (*s).to_owned())
            .chain(CURATED_WORDS.iter().map(|w| (*w).to_owned()))
            .chain(chars);

        for entry in entries {
            // sentinels are always present, whatever the cap
            if vocab.tokens.len() >= max_size.max(SENTINELS.len()) {
                break;
            }
            vocab.push(entry);
        }
        vocab
    }

    fn push(&mut self, token: String) {
        if self.ids.contains_key(&token) {
            return;
        }
        let id = self.tokens.len() as i64;
        self.ids.insert(token.clone(), id);
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn id_of(&self, token: &str) -> i64 {
        self.ids.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Token text for `id`, clamping out-of-range ids into bounds.
    pub fn token_of(&self, id: i64) -> &str {
        let max = self.tokens.len().saturating_sub(1) as i64;
        let idx = id.clamp(0, max) as usize;
        self.tokens.get(idx).map(String::as_str).unwrap_or(SENTINELS[UNK_ID as usize])
    }

    /// Encode `text` as START, word ids, END, then truncate or PAD to `target_len`.
    pub fn encode(&self, text: &str, target_len: usize) -> Vec<i64> {
        let mut ids = Vec::with_capacity(target_len);
        ids.push(START_ID);
        ids.extend(split_words(&text.to_lowercase()).iter().map(|w| self.id_of(w)));
        ids.push(END_ID);
        ids.resize(target_len, PAD_ID);
        ids
    }

    /// Decode ids back to text, dropping PAD/START/END.
    pub fn decode(&self, ids: &[i64]) -> String {
        let max = self.tokens.len().saturating_sub(1) as i64;
        ids.iter()
            .map(|&id| id.clamp(0, max))
            .filter(|id| !matches!(*id, PAD_ID | START_ID | END_ID))
            .map(|id| self.token_of(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::build(DEFAULT_MAX_VOCAB)
    }
}

/// Split into runs of alphanumerics (plus inner apostrophes) and lone punctuation.
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || (ch == '\'' && !current.is_empty()) {
            current.push(ch);
            continue;
        }
        if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        if !ch.is_whitespace() {
            words.push(ch.to_string());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_have_fixed_ids() {
        let v = Vocabulary::default();
        assert_eq!(v.id_of("<pad>"), PAD_ID);
        assert_eq!(v.id_of("[UNK]"), UNK_ID);
        assert_eq!(v.id_of("<start>"), START_ID);
        assert_eq!(v.id_of("<end>"), END_ID);
        // first curated word follows the sentinels
        assert_eq!(v.id_of("the"), 4);
    }

    #[test]
    fn build_is_deterministic() {
        let a = Vocabulary::build(500);
        let b = Vocabulary::build(500);
        assert_eq!(a.tokens, b.tokens);
    }

    #[test]
    fn cap_truncates_character_tail() {
        let v = Vocabulary::build(10);
        assert_eq!(v.len(), 10);
        assert_eq!(v.id_of("z"), UNK_ID);
        let tiny = Vocabulary::build(0);
        assert_eq!(tiny.len(), 4);
    }

    #[test]
    fn round_trip_known_words() {
        let v = Vocabulary::default();
        let ids = v.encode("Hello World", 128);
        assert_eq!(ids.len(), 128);
        assert_eq!(ids[0], START_ID);
        assert_eq!(ids[3], END_ID);
        assert!(ids[4..].iter().all(|&id| id == PAD_ID));
        assert_eq!(v.decode(&ids), "hello world");
    }

    #[test]
    fn unknown_word_becomes_placeholder() {
        let v = Vocabulary::default();
        let ids = v.encode("hello zyzzyva", 16);
        assert_eq!(ids[2], UNK_ID);
        assert_eq!(v.decode(&ids), "hello [UNK]");
    }

    #[test]
    fn long_input_is_truncated() {
        let v = Vocabulary::default();
        let ids = v.encode("the battery is low and the phone is hot", 4);
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], START_ID);
        assert_ne!(ids[3], END_ID);
    }

    #[test]
    fn out_of_range_ids_are_clamped() {
        let v = Vocabulary::default();
        let last = v.token_of(v.len() as i64 - 1).to_owned();
        assert_eq!(v.decode(&[9_999_999]), last);
        // negative clamps to PAD and is dropped
        assert_eq!(v.decode(&[-5, v.id_of("battery")]), "battery");
    }

    #[test]
    fn punctuation_splits_off() {
        assert_eq!(split_words("what's my battery?"), vec!["what's", "my", "battery", "?"]);
    }
}
