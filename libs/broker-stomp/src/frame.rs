use archiver_api::BrokerError;

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    /// Header pairs in wire order; repeated names are kept.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of `name`. STOMP header names are case-sensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append the wire form of this frame (NUL-terminated) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let escape = escapes_headers(&self.command);
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(out, name);
                out.push(b':');
                push_escaped(out, value);
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
    }

    /// Try to decode one frame from the front of `buf`.
    ///
    /// - `Ok(Some((frame, consumed)))`: a complete frame, `consumed` bytes used
    ///   (including heart-beat EOLs before it)
    /// - `Ok(None)`: more bytes needed
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, BrokerError> {
        let start = buf
            .iter()
            .position(|&b| b != b'\n' && b != b'\r')
            .unwrap_or(buf.len());
        let rest = &buf[start..];
        if rest.is_empty() {
            return Ok(None);
        }

        let Some((head_len, body_start)) = find_head_end(rest) else {
            return Ok(None);
        };
        let head = std::str::from_utf8(&rest[..head_len])
            .map_err(|e| BrokerError::protocol(format!("frame header is not UTF-8: {e}")))?;
        let mut lines = head.lines();
        let command = lines
            .next()
            .map(str::trim_end)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BrokerError::protocol("frame without command"))?
            .to_string();

        let escape = escapes_headers(&command);
        let mut headers = Vec::new();
        for line in lines {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| BrokerError::protocol(format!("malformed header line '{line}'")))?;
            if escape {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| BrokerError::protocol(format!("bad content-length '{v}'")))
            })
            .transpose()?;

        let body_region = &rest[body_start..];
        let body_len = match content_length {
            Some(len) => {
                if body_region.len() <= len {
                    return Ok(None);
                }
                if body_region[len] != 0 {
                    return Err(BrokerError::protocol("frame body not NUL-terminated"));
                }
                len
            }
            None => match body_region.iter().position(|&b| b == 0) {
                Some(pos) => pos,
                None => return Ok(None),
            },
        };

        let frame = Frame {
            command,
            headers,
            body: body_region[..body_len].to_vec(),
        };
        Ok(Some((frame, start + body_start + body_len + 1)))
    }
}

/// CONNECT and CONNECTED frames carry headers verbatim.
fn escapes_headers(command: &str) -> bool {
    command != "CONNECT" && command != "CONNECTED"
}

/// Length of the header block and the offset where the body starts.
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn push_escaped(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b':' => out.extend_from_slice(b"\\c"),
            _ => out.push(b),
        }
    }
}

fn unescape(s: &str) -> Result<String, BrokerError> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(BrokerError::protocol(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
