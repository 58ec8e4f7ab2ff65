//! Small quick-xml helpers shared by the WebDAV and SOAP adapters.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{BackendError, BackendResult};

/// Thin wrapper turning writer failures into backend errors.
pub(crate) struct XmlBuilder {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlBuilder {
    pub(crate) fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    fn write(&mut self, event: Event<'_>) -> BackendResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| BackendError::internal(format!("failed to write XML: {}", e)))
    }

    pub(crate) fn open(&mut self, element: BytesStart<'_>) -> BackendResult<()> {
        self.write(Event::Start(element))
    }

    pub(crate) fn open_tag(&mut self, name: &str) -> BackendResult<()> {
        self.open(BytesStart::new(name))
    }

    pub(crate) fn close(&mut self, name: &str) -> BackendResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    pub(crate) fn empty(&mut self, element: BytesStart<'_>) -> BackendResult<()> {
        self.write(Event::Empty(element))
    }

    pub(crate) fn empty_tag(&mut self, name: &str) -> BackendResult<()> {
        self.empty(BytesStart::new(name))
    }

    pub(crate) fn text(&mut self, text: &str) -> BackendResult<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    /// Writes `<name>text</name>`.
    pub(crate) fn text_element(&mut self, name: &str, text: &str) -> BackendResult<()> {
        self.open_tag(name)?;
        self.text(text)?;
        self.close(name)
    }

    pub(crate) fn finish(self) -> BackendResult<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| BackendError::internal(format!("generated XML is not UTF-8: {}", e)))
    }
}

/// Element name without its namespace prefix.
pub(crate) fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix() {
        assert_eq!(local_name(b"d:href"), "href");
        assert_eq!(local_name(b"href"), "href");
        assert_eq!(local_name(b"m:ResponseCode"), "ResponseCode");
    }

    #[test]
    fn builds_escaped_document() {
        let mut xml = XmlBuilder::new();
        xml.open_tag("a").unwrap();
        xml.text_element("b", "x & y").unwrap();
        xml.empty_tag("c").unwrap();
        xml.close("a").unwrap();
        assert_eq!(xml.finish().unwrap(), "<a><b>x &amp; y</b><c/></a>");
    }
}
