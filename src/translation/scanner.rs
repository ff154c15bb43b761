#[derive(Clone, Copy)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    /// `[identifier]`, where `]]` escapes a bracket.
    Bracketed,
    LineComment,
    BlockComment(u32),
}

/// End (exclusive) of the identifier starting at `start`.
pub(super) fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}
