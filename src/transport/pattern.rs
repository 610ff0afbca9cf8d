/// Match `channel` against a Redis-style glob `pattern`.
///
/// Supports `*` (any run of characters, including none), `?` (exactly one
/// character) and `\` escaping the next character.
pub fn glob_match(pattern: &str, channel: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let channel: Vec<char> = channel.chars().collect();

    let (mut p, mut c) = (0, 0);
    // Position of the last `*` seen and the channel index it is matched up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while c < channel.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                c += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == channel[c] => {
                p += 2;
                c += 1;
                continue;
            }
            Some(&ch) if ch != '\\' && ch == channel[c] => {
                p += 1;
                c += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                c = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

/// Why `segment` cannot be embedded literally in a channel pattern, if it
/// cannot. Both the application id and event type names end up in channel
/// names that the listener matches against `<app_id>:events:*`.
pub(crate) fn literal_segment_problem(segment: &str) -> Option<&'static str> {
    if segment.is_empty() {
        Some("name is empty")
    } else if segment.contains(['*', '?', '[', ']', '\\']) {
        Some("name contains a glob metacharacter")
    } else if segment.chars().any(char::is_whitespace) {
        Some("name contains whitespace")
    } else {
        None
    }
}
