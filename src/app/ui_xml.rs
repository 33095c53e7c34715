use crate::app::models::HierarchySnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent<'a> {
    Open {
        name: &'a str,
        attrs: Vec<(&'a str, &'a str)>,
        self_closing: bool,
        start: usize,
        end: usize,
    },
    Close {
        name: &'a str,
        start: usize,
        end: usize,
    },
}

fn skip_until(bytes: &[u8], mut index: usize, terminator: &[u8]) -> usize {
    while index + terminator.len() <= bytes.len() {
        if &bytes[index..index + terminator.len()] == terminator {
            return index + terminator.len();
        }
        index += 1;
    }
    bytes.len()
}

fn skip_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

/// Minimal tag scanner for `uiautomator dump` output.
///
/// Comments, processing instructions and text content are skipped. Attribute
/// values must be quoted.
pub fn scan_xml(xml: &str) -> Result<Vec<XmlEvent<'_>>, String> {
    let bytes = xml.as_bytes();
    let mut events = Vec::new();
    let mut index: usize = 0;

    while index < bytes.len() {
        if bytes[index] != b'<' {
            index += 1;
            continue;
        }
        if index + 1 >= bytes.len() {
            break;
        }
        let start = index;
        match bytes[index + 1] {
            b'/' => {
                let name_start = index + 2;
                let end = skip_until(bytes, name_start, b">");
                let name_end = if end > name_start && bytes[end - 1] == b'>' {
                    end - 1
                } else {
                    end
                };
                events.push(XmlEvent::Close {
                    name: xml[name_start..name_end].trim(),
                    start,
                    end,
                });
                index = end;
            }
            b'!' => {
                index = skip_until(bytes, index + 2, b"-->");
            }
            b'?' => {
                index = skip_until(bytes, index + 2, b"?>");
            }
            _ => {
                let name_start = index + 1;
                let mut cursor = name_start;
                while cursor < bytes.len() {
                    let ch = bytes[cursor];
                    if ch == b'/' || ch == b'>' || ch.is_ascii_whitespace() {
                        break;
                    }
                    cursor += 1;
                }
                let name = &xml[name_start..cursor];
                let mut attrs = Vec::new();
                let mut self_closing = false;
                loop {
                    cursor = skip_whitespace(bytes, cursor);
                    if cursor >= bytes.len() {
                        return Err(format!("Unterminated tag <{name}>"));
                    }
                    match bytes[cursor] {
                        b'>' => {
                            cursor += 1;
                            break;
                        }
                        b'/' => {
                            self_closing = true;
                            cursor = skip_until(bytes, cursor, b">");
                            break;
                        }
                        _ => {}
                    }

                    let attr_start = cursor;
                    while cursor < bytes.len()
                        && bytes[cursor] != b'='
                        && !bytes[cursor].is_ascii_whitespace()
                    {
                        cursor += 1;
                    }
                    let attr_name = &xml[attr_start..cursor];
                    cursor = skip_whitespace(bytes, cursor);
                    if cursor >= bytes.len() || bytes[cursor] != b'=' {
                        return Err("Malformed attribute assignment".into());
                    }
                    cursor = skip_whitespace(bytes, cursor + 1);
                    if cursor >= bytes.len() {
                        return Err("Missing attribute value".into());
                    }
                    let quote = bytes[cursor];
                    if quote != b'"' && quote != b'\'' {
                        return Err("Attribute value must be quoted".into());
                    }
                    let value_start = cursor + 1;
                    let value_end = match bytes[value_start..].iter().position(|b| *b == quote) {
                        Some(offset) => value_start + offset,
                        None => return Err("Unterminated attribute value".into()),
                    };
                    attrs.push((attr_name, &xml[value_start..value_end]));
                    cursor = value_end + 1;
                }
                events.push(XmlEvent::Open {
                    name,
                    attrs,
                    self_closing,
                    start,
                    end: cursor,
                });
                index = cursor;
            }
        }
    }

    Ok(events)
}

/// Summarises a hierarchy dump. Unparseable input yields an empty snapshot.
pub fn summarize_hierarchy(xml: &str) -> HierarchySnapshot {
    let Ok(events) = scan_xml(xml) else {
        return HierarchySnapshot::default();
    };

    let mut snapshot = HierarchySnapshot::default();
    let mut root_start: Option<usize> = None;
    for event in &events {
        match event {
            XmlEvent::Open {
                name: "hierarchy",
                self_closing,
                start,
                end,
                ..
            } => {
                snapshot.has_root = true;
                if *self_closing {
                    snapshot.hierarchy_size = end - start;
                } else if root_start.is_none() {
                    root_start = Some(*start);
                }
            }
            XmlEvent::Open { name: "node", .. } => {
                snapshot.node_count += 1;
            }
            XmlEvent::Close {
                name: "hierarchy",
                end,
                ..
            } => {
                if let Some(start) = root_start.take() {
                    snapshot.hierarchy_size = end - start;
                }
            }
            _ => {}
        }
    }
    // Truncated dumps: count up to the end of input.
    if let Some(start) = root_start {
        snapshot.hierarchy_size = xml.trim_end().len() - start;
    }
    snapshot
}
