//! Line-level helpers used before grammar dispatch.

/// Locate the end of the header block.
///
/// Returns the length of the header block (without the blank line) and the
/// offset of the first body byte. Accepts bare-LF line endings.
pub fn find_header_end(data: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, &b) in data.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &data[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && line_start > 0 {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}

/// Split a header block into logical lines, joining continuation lines
/// (those starting with SP or HTAB) onto the previous one with a single
/// space. CR is stripped and blank lines are dropped.
pub fn unfold_lines(block: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in block.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            continue;
        }
        let continues = line.starts_with([' ', '\t']);
        match lines.last_mut() {
            Some(previous) if continues => {
                previous.truncate(previous.trim_end().len());
                previous.push(' ');
                previous.push_str(line.trim_start());
            }
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// Best-effort Content-Length lookup over raw header bytes.
///
/// Used when the block fails to parse, so a framer can still skip the
/// body of a message it is discarding. Any unreadable value counts as
/// absent.
pub fn scan_content_length(header_block: &[u8]) -> Option<usize> {
    header_block.split(|&b| b == b'\n').find_map(|line| {
        let colon = line.iter().position(|&b| b == b':')?;
        let name = std::str::from_utf8(&line[..colon]).ok()?.trim();
        if !(name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("l")) {
            return None;
        }
        std::str::from_utf8(&line[colon + 1..]).ok()?.trim().parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_end_with_crlf_and_lf() {
        let data = b"OPTIONS sip:a SIP/2.0\r\nl: 2\r\n\r\nhi";
        let (head, body) = find_header_end(data).unwrap();
        assert_eq!(&data[..head], b"OPTIONS sip:a SIP/2.0\r\nl: 2\r\n");
        assert_eq!(&data[body..], b"hi");

        let data = b"SIP/2.0 200 OK\nCall-ID: x\n\n";
        let (head, body) = find_header_end(data).unwrap();
        assert_eq!(head, 26);
        assert_eq!(body, data.len());
        assert_eq!(find_header_end(b"SIP/2.0 200 OK\r\n"), None);
    }

    #[test]
    fn folded_lines_are_joined() {
        let lines = unfold_lines("Subject: I know you're there,\r\n   pick up the phone\r\nTo: <sip:b@x>\r\n");
        assert_eq!(lines, ["Subject: I know you're there, pick up the phone", "To: <sip:b@x>"]);
    }

    #[test]
    fn content_length_scan_is_lenient() {
        assert_eq!(scan_content_length(b"INVITE x\r\nl :  12\r\n"), Some(12));
        assert_eq!(scan_content_length(b"INVITE x\r\nContent-Length: abc\r\n"), None);
        assert_eq!(scan_content_length(b"INVITE x\r\nTo: y\r\n"), None);
    }
}
