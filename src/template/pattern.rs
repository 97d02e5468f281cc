//! String patterns: `'10?'B`, `'AB*'O`, `pattern "ab?*"` and friends.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Bitstring,
    Hexstring,
    Octetstring,
    Charstring,
    UniversalCharstring,
}

impl PatternKind {
    /// Character patterns may embed references and may convert into the
    /// other character kind; binary patterns do neither.
    #[must_use]
    pub fn is_character_kind(self) -> bool {
        matches!(self, Self::Charstring | Self::UniversalCharstring)
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bitstring => "bitstring",
            Self::Hexstring => "hexstring",
            Self::Octetstring => "octetstring",
            Self::Charstring => "charstring",
            Self::UniversalCharstring => "universal charstring",
        }
    }

    /// Target-language constructor selector.
    #[must_use]
    pub fn target_token(self) -> &'static str {
        match self {
            Self::Bitstring => "BSTR_PATTERN",
            Self::Hexstring => "HSTR_PATTERN",
            Self::Octetstring => "OSTR_PATTERN",
            Self::Charstring => "CSTR_PATTERN",
            Self::UniversalCharstring => "USTR_PATTERN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StringPattern {
    pub kind: PatternKind,
    pub text: String,
    pub nocase: bool,
}

impl StringPattern {
    #[must_use]
    pub fn new(kind: PatternKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            nocase: false,
        }
    }

    #[must_use]
    pub fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }

    /// Minimum number of elements a matching value must have.
    ///
    /// `?` stands for exactly one element; `*` for any number including
    /// none, so it contributes nothing. Octetstring patterns count fixed
    /// hex digits in pairs.
    #[must_use]
    pub fn min_length(&self) -> usize {
        let mut total = 0usize;
        let mut pending_digits = 0usize;
        let mut chars = self.text.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '*' => {
                    total += flush_digits(&mut pending_digits, self.kind);
                }
                '?' => {
                    total += flush_digits(&mut pending_digits, self.kind);
                    total += 1;
                }
                '\\' if self.kind.is_character_kind() => {
                    // Escaped metacharacter matches itself.
                    if chars.next().is_some() {
                        total += 1;
                    }
                }
                '[' if self.kind.is_character_kind() => {
                    // A character class matches exactly one character.
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            break;
                        }
                    }
                    total += 1;
                }
                other => match self.kind {
                    PatternKind::Bitstring | PatternKind::Hexstring => {
                        if other.is_ascii_alphanumeric() {
                            total += 1;
                        }
                    }
                    PatternKind::Octetstring => {
                        if other.is_ascii_hexdigit() {
                            pending_digits += 1;
                        }
                    }
                    PatternKind::Charstring | PatternKind::UniversalCharstring => {
                        total += 1;
                    }
                },
            }
        }
        total + flush_digits(&mut pending_digits, self.kind)
    }

    /// True when the pattern can match values longer than `min_length`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        let mut chars = self.text.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '*' => return true,
                '\\' if self.kind.is_character_kind() => {
                    let _ = chars.next();
                }
                _ => {}
            }
        }
        false
    }

    /// Names referenced from the pattern body (`{ref}` segments).
    /// Only character patterns may embed these.
    #[must_use]
    pub fn embedded_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        let mut chars = self.text.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                let _ = chars.next();
                continue;
            }
            if ch == '{' {
                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }
                let trimmed = name.trim();
                if !trimmed.is_empty() {
                    refs.push(trimmed.to_string());
                }
            }
        }
        refs
    }

    /// The same pattern reinterpreted as a universal charstring pattern.
    #[must_use]
    pub fn into_universal(&self) -> Self {
        Self {
            kind: PatternKind::UniversalCharstring,
            text: self.text.clone(),
            nocase: self.nocase,
        }
    }
}

fn flush_digits(pending: &mut usize, kind: PatternKind) -> usize {
    let digits = std::mem::take(pending);
    if kind == PatternKind::Octetstring {
        digits.div_ceil(2)
    } else {
        digits
    }
}
