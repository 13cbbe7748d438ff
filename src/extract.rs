//! Pulls the implementation out of a model reply.
//!
//! Fence grammar: three backticks, an optional language tag made of ASCII
//! letters and digits, optional whitespace, an optional newline, then the body
//! up to the next three backticks. Blocks are matched left to right without
//! overlap and only the last one is kept. An opening fence with no closing
//! fence never matches. A tag such as `c++` ends at the first character that
//! is not a letter or digit; the rest of that line becomes part of the body.

use regex::Regex;
use std::sync::OnceLock;

/// The last fenced block found in a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9]*)\s*\n?(.*?)```").expect("fence pattern is valid")
    })
}

/// Return the trimmed body of the last fenced block, if the text has one.
///
/// An empty block yields `Some("")`: callers should treat that as a real
/// extraction and only leave their preview alone on `None`.
pub fn extract_code(text: &str) -> Option<String> {
    extract_code_block(text).map(|block| block.code)
}

/// Like [`extract_code`], but keeps the language tag of the block.
pub fn extract_code_block(text: &str) -> Option<CodeBlock> {
    let captures = fence_regex().captures_iter(text).last()?;

    let language = captures
        .get(1)
        .map(|m| m.as_str())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string);
    let code = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(CodeBlock { language, code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fence_is_absent() {
        assert_eq!(extract_code("Just some prose, no code here."), None);
        assert_eq!(extract_code(""), None);
    }

    #[test]
    fn test_last_block_wins() {
        let text = "```py\nprint(1)\n```\nprose\n```js\nconsole.log(2)\n```";
        assert_eq!(extract_code(text).as_deref(), Some("console.log(2)"));
    }

    #[test]
    fn test_empty_block_is_present() {
        assert_eq!(extract_code("```\n\n```").as_deref(), Some(""));
        assert_eq!(extract_code("```\n```").as_deref(), Some(""));
    }

    #[test]
    fn test_unclosed_fence_is_ignored() {
        assert_eq!(extract_code("Here you go:\n```rust\nfn main() {}\n"), None);

        let text = "```ts\nconst a = 1;\n```\nand then\n```ts\nconst b = 2;";
        assert_eq!(extract_code(text).as_deref(), Some("const a = 1;"));
    }

    #[test]
    fn test_body_is_trimmed_and_multiline() {
        let text = "Explanation first.\n\n```typescript\n\n  export const x = 1;\n  export const y = 2;\n\n```\n";
        assert_eq!(
            extract_code(text).as_deref(),
            Some("export const x = 1;\n  export const y = 2;")
        );
    }

    #[test]
    fn test_language_tag_is_captured() {
        let block = extract_code_block("```rust\nfn main() {}\n```").unwrap();
        assert_eq!(block.language.as_deref(), Some("rust"));
        assert_eq!(block.code, "fn main() {}");

        let untagged = extract_code_block("```\nplain\n```").unwrap();
        assert_eq!(untagged.language, None);
    }

    #[test]
    fn test_non_alphanumeric_tag_still_matches() {
        let block = extract_code_block("```c++\nint main() {}\n```").unwrap();
        assert_eq!(block.language.as_deref(), Some("c"));
        assert_eq!(block.code, "++\nint main() {}");
    }

    #[test]
    fn test_three_blocks_returns_third() {
        let text = "```a\none\n```\n```b\ntwo\n```\n```c\nthree\n```";
        assert_eq!(extract_code(text).as_deref(), Some("three"));
    }
}
