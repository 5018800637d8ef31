//! Link-header pagination parsing.
//!
//! The stargazers endpoint reports its page count only through the response
//! Link header, e.g.
//! `<...&page=2>; rel="next", <...&page=42>; rel="last"`.

/// Extract the total page count from a Link header.
///
/// Returns the page number of the `rel="last"` entry when the header also
/// carries a `rel="next"` entry; a missing, empty, or malformed header means
/// everything fit on one page, so this returns 1.
pub fn last_page_from_link(header: &str) -> usize {
    let Some(next_at) = header.find("rel=\"next\"") else {
        return 1;
    };
    let tail = &header[next_at..];
    let Some(last_at) = tail.find("rel=\"last\"") else {
        return 1;
    };
    // The last-page URL is the bracketed segment just before rel="last";
    // its page parameter is the final one in the stretch between the two
    // relations.
    trailing_page_param(&tail[..last_at]).unwrap_or(1)
}

/// Find the value of the last `page=` query parameter in `segment`,
/// skipping non-parameter matches such as `per_page=`.
fn trailing_page_param(segment: &str) -> Option<usize> {
    let bytes = segment.as_bytes();
    let mut found = None;
    let mut from = 0;
    while let Some(i) = segment[from..].find("page=") {
        let at = from + i;
        from = at + "page=".len();
        let is_param = at == 0 || matches!(bytes[at - 1], b'?' | b'&');
        if !is_param {
            continue;
        }
        let digits: &str = &segment[from..];
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        if let Ok(n) = digits[..end].parse::<usize>() {
            found = Some(n);
        }
    }
    found
}
