/// Returns the suffix of `full_text` that arrived after the first `previous_len` bytes.
///
/// An equal or shorter snapshot yields an empty chunk. A `previous_len` that
/// lands inside a multi-byte character is moved forward to the next boundary.
pub fn extract_new_chunk(full_text: &str, previous_len: usize) -> &str {
    if full_text.len() <= previous_len {
        return "";
    }
    let mut start = previous_len;
    while !full_text.is_char_boundary(start) {
        start += 1;
    }
    &full_text[start..]
}
