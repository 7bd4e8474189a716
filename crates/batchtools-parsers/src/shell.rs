//! POSIX shell quoting for commands handed to `sh -c` or `sbatch --wrap`.

/// Characters that never need quoting in a POSIX shell word.
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '=' | '+' | '@' | '%')
}

/// Quote a single word so the shell reads it back unchanged.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }
    // Close the quote, emit an escaped quote, reopen.
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Join words into one shell command line.
pub fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("python"), "python");
        assert_eq!(shell_quote("--config=run.yaml"), "--config=run.yaml");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_shell_join() {
        let words = ["python", "run.py", "--label", "a b"];
        assert_eq!(shell_join(&words), "python run.py --label 'a b'");
        let empty: [&str; 0] = [];
        assert_eq!(shell_join(&empty), "");
    }
}
