//! # Utilidades de Texto
//!
//! Tokenização e geração de n-gramas no mesmo formato que o scikit-learn usa
//! nos seus vetorizadores. Os extratores de features (externos a este crate)
//! também usam estas funções, por isso elas são públicas.
//!
//! ## Tokenização
//!
//! Um token é qualquer sequência máxima de letras, dígitos ou `_` Unicode:
//!
//! ```text
//! "E-mail ou usuário_1" → ["E", "mail", "ou", "usuário_1"]
//! ```

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("regex de token válida"))
}

fn decimal_digit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{Nd}").expect("regex de dígitos válida"))
}

fn letter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{L}").expect("regex de letras válida"))
}

fn multi_space_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("regex de espaços válida"))
}

/// Extrai tokens de palavra (equivalente Unicode de `\w+`).
pub fn tokenize(text: &str) -> Vec<String> {
    token_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// N-gramas de caracteres de tamanho `min_n..=max_n`.
///
/// Trabalha sobre caracteres Unicode, não bytes. Tamanhos maiores que o
/// texto são pulados.
pub fn char_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut res = Vec::new();
    for n in min_n.max(1)..=max_n.min(chars.len()) {
        for window in chars.windows(n) {
            res.push(window.iter().collect());
        }
    }
    res
}

/// N-gramas de tokens, unidos por um espaço.
pub fn token_ngrams<S: AsRef<str>>(tokens: &[S], min_n: usize, max_n: usize) -> Vec<String> {
    let mut res = Vec::new();
    for n in min_n.max(1)..=max_n.min(tokens.len()) {
        for window in tokens.windows(n) {
            let joined: Vec<&str> = window.iter().map(AsRef::as_ref).collect();
            res.push(joined.join(" "));
        }
    }
    res
}

/// Troca quebras de linha por espaço e colapsa sequências de espaços.
pub fn normalize_whitespace(text: &str) -> String {
    let no_newlines = text.replace(&['\n', '\r'][..], " ");
    multi_space_regex().replace_all(&no_newlines, " ").into_owned()
}

/// Lowercase + [`normalize_whitespace`].
pub fn normalize(text: &str) -> String {
    normalize_whitespace(&text.to_lowercase())
}

/// Padrão numérico de um valor (ex: opções de `<select>` com datas).
///
/// A fração de dígitos decimais (`\p{Nd}`) é medida sobre todos os
/// caracteres. Se for `>= ratio`, dígitos ASCII viram `X` e letras viram `C`,
/// exceto o próprio `X` (`"12/ab"` → `"XX/CC"`). Caso contrário devolve
/// string vazia.
pub fn number_pattern(text: &str, ratio: f64) -> String {
    let total = text.chars().count();
    if total == 0 {
        return String::new();
    }
    let digits = decimal_digit_regex().find_iter(text).count();
    if (digits as f64 / total as f64) < ratio {
        return String::new();
    }
    let digits_as_x: String = text
        .chars()
        .map(|c| if c.is_ascii_digit() { 'X' } else { c })
        .collect();
    letter_regex()
        .replace_all(&digits_as_x, |caps: &Captures| if &caps[0] == "X" { "X" } else { "C" })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_unicode_words() {
        assert_eq!(
            tokenize("E-mail ou usuário_1!"),
            vec!["E", "mail", "ou", "usuário_1"]
        );
        assert!(tokenize("  ,;  ").is_empty());
    }

    #[test]
    fn test_char_ngrams() {
        assert_eq!(char_ngrams("abc", 2, 3), vec!["ab", "bc", "abc"]);
        // n maior que o texto é ignorado
        assert!(char_ngrams("ab", 3, 5).is_empty());
        assert_eq!(char_ngrams("çã", 1, 1), vec!["ç", "ã"]);
    }

    #[test]
    fn test_token_ngrams() {
        let tokens = ["sign", "in", "now"];
        assert_eq!(
            token_ngrams(&tokens, 1, 2),
            vec!["sign", "in", "now", "sign in", "in now"]
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Log\nIN   Now"), "log in now");
    }

    #[test]
    fn test_number_pattern() {
        assert_eq!(number_pattern("2024", 0.3), "XXXX");
        assert_eq!(number_pattern("jan 01", 0.3), "CCC XX");
        assert_eq!(number_pattern("january", 0.3), "");
        assert_eq!(number_pattern("", 0.3), "");
    }

    #[test]
    fn test_number_pattern_character_classes() {
        // X maiúsculo é preservado; outras letras viram C
        assert_eq!(number_pattern("12X", 0.3), "XXX");
        assert_eq!(number_pattern("12x", 0.3), "XXC");
        // só dígitos decimais contam; dígitos não-ASCII não são trocados
        assert_eq!(number_pattern("²²", 0.3), "");
        assert_eq!(number_pattern("٣٤a", 0.5), "٣٤C");
    }
}
