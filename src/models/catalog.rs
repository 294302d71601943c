//! Catalog of known model identifiers, grouped by use.

use serde::Serialize;

/// What a catalogued model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCategory {
    TextToMusic,
    TextToMidi,
    TextToSound,
    MelodyConditioned,
    MelodyContinuation,
}

impl ModelCategory {
    /// All categories in display order.
    pub const ALL: [ModelCategory; 5] = [
        ModelCategory::TextToMusic,
        ModelCategory::TextToMidi,
        ModelCategory::TextToSound,
        ModelCategory::MelodyConditioned,
        ModelCategory::MelodyContinuation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::TextToMusic => "text-to-music",
            ModelCategory::TextToMidi => "text-to-midi",
            ModelCategory::TextToSound => "text-to-sound",
            ModelCategory::MelodyConditioned => "melody-conditioned",
            ModelCategory::MelodyContinuation => "melody-continuation",
        }
    }

    /// Whether captions for these models should describe sounds, not music.
    pub fn is_sound(&self) -> bool {
        matches!(self, ModelCategory::TextToSound)
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A catalogued model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelCard {
    pub id: &'static str,
    pub category: ModelCategory,
    pub description: &'static str,
    pub stereo: bool,
}

const fn card(
    id: &'static str,
    category: ModelCategory,
    description: &'static str,
    stereo: bool,
) -> ModelCard {
    ModelCard {
        id,
        category,
        description,
        stereo,
    }
}

use ModelCategory::*;

/// Every model the daemon knows how to route.
pub const MODEL_CARDS: &[ModelCard] = &[
    card("facebook/musicgen-small", TextToMusic, "300M transformer decoder.", false),
    card("facebook/musicgen-medium", TextToMusic, "1.5B transformer decoder.", false),
    card("facebook/musicgen-large", TextToMusic, "3.3B transformer decoder.", false),
    card(
        "facebook/magnet-small-10secs",
        TextToMusic,
        "300M non-autoregressive transformer, 10 second clips.",
        false,
    ),
    card(
        "facebook/magnet-medium-10secs",
        TextToMusic,
        "1.5B non-autoregressive transformer, 10 second clips.",
        false,
    ),
    card(
        "facebook/magnet-small-30secs",
        TextToMusic,
        "300M non-autoregressive transformer, 30 second clips.",
        false,
    ),
    card(
        "facebook/magnet-medium-30secs",
        TextToMusic,
        "1.5B non-autoregressive transformer, 30 second clips.",
        false,
    ),
    card("facebook/musicgen-stereo-small", TextToMusic, "300M transformer decoder, stereo output.", true),
    card("facebook/musicgen-stereo-medium", TextToMusic, "1.5B transformer decoder, stereo output.", true),
    card("facebook/musicgen-stereo-large", TextToMusic, "3.3B transformer decoder, stereo output.", true),
    card(
        "musiclang/musiclang-v2",
        TextToMidi,
        "Symbolic music from text prompts. Not runnable by the current backends.",
        false,
    ),
    card(
        "facebook/audio-magnet-small",
        TextToSound,
        "300M non-autoregressive transformer, 10 second sound effects.",
        false,
    ),
    card(
        "facebook/audio-magnet-medium",
        TextToSound,
        "1.5B non-autoregressive transformer, 10 second sound effects.",
        false,
    ),
    card(
        "facebook/audiogen-medium",
        TextToSound,
        "1.5B transformer decoder for sound effects.",
        false,
    ),
    card(
        "facebook/musicgen-melody",
        MelodyConditioned,
        "1.5B transformer decoder with melody conditioning.",
        false,
    ),
    card(
        "facebook/musicgen-melody-large",
        MelodyConditioned,
        "3.3B transformer decoder with melody conditioning.",
        false,
    ),
    card(
        "facebook/musicgen-stereo-melody",
        MelodyConditioned,
        "1.5B melody-conditioned decoder, stereo output.",
        true,
    ),
    card(
        "facebook/musicgen-stereo-melody-large",
        MelodyConditioned,
        "3.3B melody-conditioned decoder, stereo output.",
        true,
    ),
    card(
        "musicgen-continuation",
        MelodyContinuation,
        "Extends a recorded audio prefix with a musicgen decoder.",
        false,
    ),
];

/// Looks up a catalogued model by identifier.
pub fn find(id: &str) -> Option<&'static ModelCard> {
    MODEL_CARDS.iter().find(|c| c.id == id)
}

/// Returns the catalogued models in a category.
pub fn cards_in(category: ModelCategory) -> impl Iterator<Item = &'static ModelCard> {
    MODEL_CARDS.iter().filter(move |c| c.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::{InferenceStrategy, ModelRegistry};

    #[test]
    fn every_card_resolves() {
        let registry = ModelRegistry::new();
        for card in MODEL_CARDS {
            let r = registry.resolve(card.id).unwrap();
            assert_eq!(r.channels == 2, card.stereo, "{}", card.id);
        }
    }

    #[test]
    fn categories_agree_with_strategies() {
        let registry = ModelRegistry::new();
        for card in MODEL_CARDS {
            let strategy = registry.strategy_for(card.id).unwrap();
            let expected = match card.category {
                TextToMusic | TextToMidi => InferenceStrategy::TextToAudio,
                TextToSound => InferenceStrategy::SoundEffect,
                MelodyConditioned => InferenceStrategy::MelodyConditioned,
                MelodyContinuation => InferenceStrategy::Continuation,
            };
            assert_eq!(strategy, expected, "{}", card.id);
        }
    }

    #[test]
    fn only_musiclang_is_unsupported() {
        let registry = ModelRegistry::new();
        let unsupported: Vec<_> = MODEL_CARDS
            .iter()
            .filter(|c| !registry.resolve(c.id).unwrap().family.is_supported())
            .map(|c| c.id)
            .collect();
        assert_eq!(unsupported, vec!["musiclang/musiclang-v2"]);
    }

    #[test]
    fn lookup() {
        assert_eq!(find("facebook/audiogen-medium").unwrap().category, TextToSound);
        assert!(find("nope").is_none());
        assert_eq!(cards_in(TextToSound).count(), 3);
        assert!(TextToSound.is_sound());
    }
}
