// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::io;
use std::str::from_utf8;

use quick_xml::events::{BytesStart, Event};

use super::model;
use crate::Node;

/// Parser is a trait for objects which can parse XML.
///
/// This trait only exists to fix the mismatch of
/// [quick_xml::Reader::read_event] when working on buffered data
/// and [quick_xml::Reader::read_event_into] when working on IO.
pub(super) trait Parser {
    fn read_event(&mut self) -> quick_xml::Result<Event<'_>>;
}

/// IoParser implements [Parser] over an [std::io::BufRead].
pub(super) struct IoParser<R: io::BufRead>(quick_xml::Reader<R>, Vec<u8>);

impl<R: io::BufRead> Parser for IoParser<R> {
    #[inline]
    fn read_event(&mut self) -> quick_xml::Result<Event<'_>> {
        self.1.clear();
        self.0.read_event_into(&mut self.1)
    }
}

/// BufParser implements [Parser] over a slice of bytes (`&[u8]`).
pub(super) struct BufParser<'a>(quick_xml::Reader<&'a [u8]>);

impl Parser for BufParser<'_> {
    #[inline]
    fn read_event(&mut self) -> quick_xml::Result<Event<'_>> {
        self.0.read_event()
    }
}

/// Reader streams osm [Features](model::Feature) from an XML document.
pub(super) struct Reader<P: Parser> {
    parser: P,
    eof: bool,
}

impl<'a> Reader<BufParser<'a>> {
    #[inline]
    pub(super) fn from_buffer(data: &'a [u8]) -> Self {
        Self {
            parser: BufParser(quick_xml::Reader::from_reader(data)),
            eof: false,
        }
    }
}

impl<R: io::BufRead> Reader<IoParser<R>> {
    #[inline]
    pub(super) fn from_io(reader: R) -> Self {
        Self {
            parser: IoParser(quick_xml::Reader::from_reader(reader), Vec::default()),
            eof: false,
        }
    }
}

impl<P: Parser> Iterator for Reader<P> {
    type Item = Result<model::Feature, quick_xml::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut f: Option<model::Feature> = None;

        while !self.eof {
            let event = match self.parser.read_event() {
                Ok(e) => e,
                Err(e) => {
                    self.eof = true;
                    return Some(Err(e));
                }
            };

            match event {
                Event::Empty(start) => match start.local_name().as_ref() {
                    b"node" => {
                        if let Some(n) = parse_node(&start) {
                            return Some(Ok(model::Feature::Node(n)));
                        }
                    }
                    b"tag" => {
                        if let Some(model::Feature::Way(w)) = &mut f {
                            if let Some((k, v)) = parse_tag(&start) {
                                w.tags.insert(k, v);
                            }
                        }
                    }
                    b"nd" => {
                        if let Some(model::Feature::Way(w)) = &mut f {
                            if let Some(ref_) = parse_nd(&start) {
                                w.nodes.push(ref_);
                            }
                        }
                    }
                    _ => {}
                },

                Event::Start(start) => match start.local_name().as_ref() {
                    b"node" => f = parse_node(&start).map(model::Feature::Node),
                    b"way" => f = parse_way(&start).map(model::Feature::Way),
                    b"remark" => f = Some(model::Feature::Remark(String::default())),
                    _ => {}
                },

                Event::Text(text) => {
                    if let Some(model::Feature::Remark(remark)) = &mut f {
                        remark.push_str(&String::from_utf8_lossy(&text));
                    }
                }

                Event::End(end) => match end.local_name().as_ref() {
                    b"node" | b"way" => {
                        if let Some(f) = f.take() {
                            return Some(Ok(f));
                        }
                    }
                    b"remark" => {
                        if let Some(model::Feature::Remark(remark)) = f.take() {
                            return Some(Ok(model::Feature::Remark(remark.trim().to_string())));
                        }
                    }
                    _ => {}
                },

                Event::Eof => {
                    self.eof = true;
                }

                _ => {}
            }
        }

        f.map(Ok)
    }
}

fn parse_node(start: &BytesStart<'_>) -> Option<Node> {
    let mut id: i64 = 0;
    let mut lat = f64::NAN;
    let mut lon = f64::NAN;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"id" => id = from_utf8(&attr.value).ok()?.parse().ok()?,
            b"lat" => lat = from_utf8(&attr.value).ok()?.parse().ok()?,
            b"lon" => lon = from_utf8(&attr.value).ok()?.parse().ok()?,
            _ => {}
        }
    }

    if id != 0 && lat.is_finite() && lon.is_finite() {
        Some(Node { id, lat, lon })
    } else {
        log::debug!("skipping malformed <node> element");
        None
    }
}

fn parse_way(start: &BytesStart<'_>) -> Option<model::Way> {
    let mut id: i64 = 0;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        if attr.key.as_ref() == b"id" {
            id = from_utf8(&attr.value).ok()?.parse().ok()?;
        }
    }

    if id != 0 {
        Some(model::Way {
            nodes: Vec::default(),
            tags: HashMap::default(),
        })
    } else {
        log::debug!("skipping <way> element without an id");
        None
    }
}

fn parse_tag(start: &BytesStart<'_>) -> Option<(String, String)> {
    let mut k = None;
    let mut v = None;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        match attr.key.as_ref() {
            b"k" => k = attr.unescape_value().ok().map(|s| s.into_owned()),
            b"v" => v = attr.unescape_value().ok().map(|s| s.into_owned()),
            _ => {}
        }
    }

    k.map(|k| (k, v.unwrap_or_default()))
}

fn parse_nd(start: &BytesStart<'_>) -> Option<i64> {
    let mut ref_: i64 = 0;

    for attr in start.attributes() {
        let attr = attr.ok()?;
        if attr.key.as_ref() == b"ref" {
            ref_ = from_utf8(&attr.value).ok()?.parse().ok()?;
        }
    }

    if ref_ != 0 {
        Some(ref_)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::model::{Feature, Way};
    use super::*;

    const GRID_XML: &[u8] = include_bytes!("test_fixtures/grid.osm");

    fn collect_all<P: Parser>(
        features: Reader<P>,
    ) -> Result<(Vec<Node>, Vec<Way>, Vec<String>), quick_xml::Error> {
        let mut nodes = Vec::default();
        let mut ways = Vec::default();
        let mut remarks = Vec::default();

        for f in features {
            match f? {
                Feature::Node(n) => nodes.push(n),
                Feature::Way(w) => ways.push(w),
                Feature::Remark(r) => remarks.push(r),
            }
        }

        Ok((nodes, ways, remarks))
    }

    fn check_grid<P: Parser>(features: Reader<P>) -> Result<(), quick_xml::Error> {
        let (nodes, ways, remarks) = collect_all(features)?;

        assert_eq!(nodes.len(), 10);
        assert_eq!(
            nodes[0],
            Node {
                id: 1,
                lat: -8.05,
                lon: -34.9,
            }
        );

        assert_eq!(ways.len(), 9);
        assert_eq!(ways[0].nodes, vec![1, 2, 3]);
        assert_eq!(
            ways[0].tags.get("highway").map(|s| s.as_str()),
            Some("residential")
        );
        assert_eq!(ways[1].tags.get("oneway").map(|s| s.as_str()), Some("yes"));

        assert!(remarks.is_empty());
        Ok(())
    }

    #[test]
    fn parse_from_buf() -> Result<(), quick_xml::Error> {
        check_grid(Reader::from_buffer(GRID_XML))
    }

    #[test]
    fn parse_from_io() -> Result<(), quick_xml::Error> {
        check_grid(Reader::from_io(io::Cursor::new(GRID_XML)))
    }

    #[test]
    fn parse_remark() -> Result<(), quick_xml::Error> {
        const DATA: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <node id="1" lat="0.0" lon="0.0"/>
  <remark> runtime error: Query timed out in "query" at line 1 after 2 seconds. </remark>
</osm>"#;

        let (nodes, ways, remarks) = collect_all(Reader::from_buffer(DATA))?;
        assert_eq!(nodes.len(), 1);
        assert!(ways.is_empty());
        assert_eq!(
            remarks,
            vec![r#"runtime error: Query timed out in "query" at line 1 after 2 seconds."#],
        );
        Ok(())
    }

    #[test]
    fn parse_malformed() {
        const DATA: &[u8] = b"<osm><way id=\"1\"><nd ref=\"1\"/></node></osm>";
        let result: Result<Vec<_>, _> = Reader::from_buffer(DATA).collect();
        assert!(result.is_err());
    }
}
