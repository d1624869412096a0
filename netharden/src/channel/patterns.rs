//! Prompt patterns for detecting that a device is ready for input.

use regex::bytes::Regex;

/// Default prompt pattern for Cisco IOS style devices.
///
/// Matches exec (`router>`), privileged (`router#`) and any configuration
/// sub-mode (`router(config-if)#`) prompts at the end of a line.
pub const IOS_PROMPT_PATTERN: &str = r"(?m)^[\w.\-@()/: ]{1,63}[>#]\s?$";

/// Compile a prompt pattern string into a regex.
///
/// Patterns without an end anchor get `\s*$` appended so they only match a
/// prompt that is the last thing on the screen.
pub fn compile_prompt_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let pattern = if pattern.ends_with('$') {
        pattern.to_string()
    } else {
        format!("{pattern}\\s*$")
    };

    Regex::new(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ios_prompts() {
        let pattern = compile_prompt_pattern(IOS_PROMPT_PATTERN).unwrap();
        assert!(pattern.is_match(b"router>"));
        assert!(pattern.is_match(b"router#"));
        assert!(pattern.is_match(b"banner line\r\nrouter# "));
        assert!(pattern.is_match(b"logging host 10.0.0.1\r\nrouter(config)#"));
        assert!(pattern.is_match(b"edge-01(config-if)#"));
    }

    #[test]
    fn test_echoed_command_is_not_a_prompt() {
        let pattern = compile_prompt_pattern(IOS_PROMPT_PATTERN).unwrap();
        assert!(!pattern.is_match(b"router#configure terminal\r\n"));
        assert!(!pattern.is_match(b"Building configuration...\r\n"));
    }

    #[test]
    fn test_compile_prompt_pattern_anchors() {
        let pattern = compile_prompt_pattern(r"switch#").unwrap();
        assert!(pattern.is_match(b"switch# "));
        assert!(!pattern.is_match(b"switch# show version"));
    }
}
