//! Text normalization applied before keyword matching.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Trim, lowercase and strip diacritics: `"  Envío ENTREGADO "` → `"envio entregado"`.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Collapse runs of whitespace (including the newlines markup leaves behind)
/// into single spaces.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_case() {
        assert_eq!(normalize("  Envío ENTREGADO "), "envio entregado");
        assert_eq!(normalize("Documentación en proceso"), "documentacion en proceso");
        assert_eq!(normalize("Ñandú"), "nandu");
    }

    #[test]
    fn squashes_markup_whitespace() {
        assert_eq!(squash_whitespace("  Centro de\n\t  Distribución  "), "Centro de Distribución");
    }
}
