use serde::Serialize;

/// A named prompt template with pre-authored phrasings used to diversify a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOption {
    pub id: &'static str,
    pub label: &'static str,
    pub base_prompt: &'static str,
    pub description: &'static str,
    pub variations: &'static [&'static str],
}

/// Appended to every prompt when the user attached a reference image.
pub const REFERENCE_IMAGE_SUFFIX: &str =
    ", using the person or subject from the uploaded image as the main character";

pub const PROMPT_OPTIONS: &[PromptOption] = &[
    PromptOption {
        id: "meme",
        label: "Create Meme Sticker",
        base_prompt: "Create meme sticker",
        description: "Funny memes with text and expressions",
        variations: &[
            "Create a happy meme sticker",
            "Create a celebration meme sticker",
            "Create a dancing meme sticker",
            "Create a workout meme sticker",
            "Create a surprised meme sticker",
            "Create a facepalm meme sticker",
            "Create a thumbs up meme sticker",
            "Create a sleepy meme sticker",
            "Create a mind blown meme sticker",
        ],
    },
    PromptOption {
        id: "christmas",
        label: "Create Christmas Sticker",
        base_prompt: "Create Christmas sticker",
        description: "Festive holiday themes with Santa, reindeer, snowflakes",
        variations: &[
            "Create a Christmas sticker with gingerbread",
            "Create a Christmas sticker with Christmas tree",
            "Create a Christmas sticker with snow",
            "Create a Christmas sticker with snowman",
        ],
    },
    PromptOption {
        id: "motivational",
        label: "Create Motivational Sticker",
        base_prompt: "Create motivational sticker",
        description: "Inspiring quotes and uplifting designs",
        variations: &[
            "Create a motivational sticker with success theme",
            "Create a motivational sticker with perseverance theme",
            "Create a motivational sticker with dream big theme",
            "Create a motivational sticker with positive vibes theme",
        ],
    },
];

pub fn find_by_id(id: &str) -> Option<&'static PromptOption> {
    let id = id.trim();
    PROMPT_OPTIONS
        .iter()
        .find(|option| option.id.eq_ignore_ascii_case(id))
}

pub fn find_by_base_prompt(text: &str) -> Option<&'static PromptOption> {
    PROMPT_OPTIONS
        .iter()
        .find(|option| option.base_prompt == text)
}

/// Expands a base prompt (or free-form text) into exactly `requested_count` prompts.
///
/// Known base prompts cycle through their variations by global image index;
/// anything else is repeated verbatim. With a reference image every prompt gets
/// [`REFERENCE_IMAGE_SUFFIX`].
pub fn resolve_variations(
    text: &str,
    requested_count: usize,
    has_reference_image: bool,
) -> Vec<String> {
    let suffix = if has_reference_image {
        REFERENCE_IMAGE_SUFFIX
    } else {
        ""
    };

    match find_by_base_prompt(text) {
        Some(option) if !option.variations.is_empty() => (0..requested_count)
            .map(|index| {
                let variation = option.variations[index % option.variations.len()];
                format!("{variation}{suffix}")
            })
            .collect(),
        _ => (0..requested_count)
            .map(|_| format!("{text}{suffix}"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_ids_are_unique_and_variations_non_empty() {
        let mut ids: Vec<_> = PROMPT_OPTIONS.iter().map(|option| option.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PROMPT_OPTIONS.len());
        assert!(PROMPT_OPTIONS
            .iter()
            .all(|option| !option.variations.is_empty()));
    }

    #[test]
    fn single_meme_prompt_uses_first_variation() {
        let prompts = resolve_variations("Create meme sticker", 1, false);
        assert_eq!(prompts, vec!["Create a happy meme sticker".to_string()]);
    }

    #[test]
    fn known_prompt_cycles_variations_past_the_end() {
        for option in PROMPT_OPTIONS {
            let count = option.variations.len() * 2 + 1;
            let prompts = resolve_variations(option.base_prompt, count, false);
            assert_eq!(prompts.len(), count);
            for index in option.variations.len()..count {
                assert_eq!(prompts[index], prompts[index - option.variations.len()]);
            }
        }
    }

    #[test]
    fn meme_prompt_index_eight_and_nine() {
        let prompts = resolve_variations("Create meme sticker", 10, false);
        assert_eq!(prompts[8], "Create a mind blown meme sticker");
        assert_eq!(prompts[9], prompts[0]);
    }

    #[test]
    fn custom_text_is_repeated_unchanged() {
        let prompts = resolve_variations("Create a sushi unicorn", 3, false);
        assert_eq!(prompts, vec!["Create a sushi unicorn".to_string(); 3]);
    }

    #[test]
    fn reference_image_appends_fixed_suffix_to_every_prompt() {
        for text in ["Create Christmas sticker", "a cat in a hat"] {
            let plain = resolve_variations(text, 7, false);
            let with_image = resolve_variations(text, 7, true);
            assert_eq!(plain.len(), with_image.len());
            for (base, suffixed) in plain.iter().zip(&with_image) {
                assert_eq!(suffixed, &format!("{base}{REFERENCE_IMAGE_SUFFIX}"));
            }
        }
    }

    #[test]
    fn zero_count_yields_no_prompts() {
        assert!(resolve_variations("Create meme sticker", 0, true).is_empty());
    }

    #[test]
    fn find_by_id_is_case_insensitive() {
        assert_eq!(
            find_by_id(" Christmas ").map(|option| option.base_prompt),
            Some("Create Christmas sticker")
        );
        assert!(find_by_id("unknown").is_none());
    }
}
