//! Offline token estimates used when a backend does not report usage.

/// Roughly 0.3 tokens per character, the Gemini tokenizer's average on mixed text.
pub fn estimate_gemini_tokens(text: &str) -> u64 {
    (text.chars().count() as f64 * 0.3) as u64 + 1
}

/// One token per CJK character plus one per four other characters.
pub fn estimate_qwen_tokens(text: &str) -> u64 {
    let (cjk, other) = text.chars().fold((0u64, 0u64), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    cjk + other / 4 + 1
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_estimate_scales_with_length() {
        assert_eq!(estimate_gemini_tokens(""), 1);
        assert_eq!(estimate_gemini_tokens(&"a".repeat(100)), 31);
    }

    #[test]
    fn qwen_counts_cjk_individually() {
        assert_eq!(estimate_qwen_tokens("你好世界"), 5);
        assert_eq!(estimate_qwen_tokens("abcdefgh"), 3);
        assert_eq!(estimate_qwen_tokens("你好abcd"), 4);
    }
}
