//! Line wrapping for edify function calls.
//!
//! Generated commands mark every place a line may break with a NUL
//! character, e.g. `delete("a",\0"b",\0"c");`. [`word_wrap`] turns those
//! markers into either a space or a newline followed by an indent that
//! lines the continuation up with the first argument.

/// Default column limit for generated script lines.
pub const LINE_LEN: usize = 80;

pub const BREAK: char = '\0';

pub fn word_wrap(cmd: &str) -> String {
    word_wrap_to(cmd, LINE_LEN)
}

pub fn word_wrap_to(cmd: &str, line_len: usize) -> String {
    let Some(open) = cmd.find('(') else {
        return cmd.replace(BREAK, " ");
    };
    let indent = cmd[..open].chars().count() + 1;
    let limit = line_len.saturating_sub(indent);
    let pad = " ".repeat(indent);

    let mut out = String::with_capacity(cmd.len() + 16);
    let mut rest = cmd;
    let mut first = true;
    loop {
        if !first {
            out.push_str(&pad);
        }
        first = false;

        if let Some(end) = break_point(rest, limit) {
            out.push_str(&rest[..end]);
            out.push('\n');
            rest = &rest[end + BREAK.len_utf8()..];
            continue;
        }

        match rest.split_once(BREAK) {
            Some((head, tail)) => {
                out.push_str(head);
                out.push('\n');
                rest = tail;
            }
            None => {
                out.push_str(rest);
                out.push('\n');
                break;
            }
        }
    }

    out.replace(BREAK, " ").trim_end_matches('\n').to_string()
}

/// Byte offset of the last break marker preceded by at most `limit`
/// characters, none of them a newline.
fn break_point(s: &str, limit: usize) -> Option<usize> {
    let mut found = None;
    for (count, (idx, ch)) in s.char_indices().enumerate() {
        if count > limit || ch == '\n' {
            break;
        }
        if ch == BREAK {
            found = Some(idx);
        }
    }
    found
}
