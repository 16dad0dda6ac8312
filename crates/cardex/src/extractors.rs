//! 🔬 The record extractor — one `businesscard` subtree in, one [`Card`] out.
//!
//! 🎬 COLD OPEN — INT. OPEN-PLAN OFFICE — 14:02 PM
//!
//! "The export is namespaced," said the ticket. "Sometimes," said the data.
//! Half the records arrive as `<businesscard>`, half as `<ns0:businesscard>`,
//! and at least one European member state has opinions about both. The
//! extractor does not take sides. It matches on local names and moves on
//! with its life.
//!
//! 🧠 Knowledge graph:
//! - [`CardCapture`] is fed quick-xml events one at a time by the stream driver,
//!   starting at the record's opening tag and ending when its closing tag brings
//!   the subtree depth back to zero. One capture alive at a time, ever.
//! - While events flow through, two things happen at once: field extraction
//!   (first `entity`'s `countrycode`, first `regdate`'s text, first `name`
//!   inside that entity) and re-serialization of the fragment into `body`.
//! - Namespace noise is stripped during re-serialization: `xmlns`/`xmlns:*`
//!   attributes are dropped and element-name prefixes removed. Everything
//!   else — attribute values, text, CDATA, escapes — is copied through in its
//!   raw source form, byte for byte.
//! - The reserved `xml:` attribute prefix is left alone. Stripping that one
//!   changes meaning, and we are in the business of moving records, not
//!   editing them.

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;

use crate::common::Card;

/// 🎯 Is this element a record boundary? Local-name match, so both the
/// namespace-prefixed and the bare spelling count.
pub(crate) fn is_businesscard(name: QName<'_>) -> bool {
    name.local_name().as_ref() == b"businesscard"
}

/// 🔤 Borrow a raw byte slice as UTF-8 or die with context. The export is
/// declared UTF-8; anything else is corruption we want to hear about.
fn raw_str(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .context("💀 Record contained bytes that are not valid UTF-8. The export lied about its encoding.")
}

/// 🧲 First attribute on this element whose *local* name matches, unescaped.
fn attr_lookup(element: &BytesStart<'_>, want: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.context("💀 Unparseable attribute inside a businesscard. The XML is having a moment.")?;
        if attr.key.local_name().as_ref() == want {
            let value = attr
                .unescape_value()
                .context("💀 Attribute value would not unescape. Entities gone feral.")?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// ✂️ Serialize an opening (or self-closing) tag with the namespace noise
/// removed: element prefix stripped, `xmlns`/`xmlns:*` declarations dropped,
/// attribute values copied through in raw escaped form.
fn push_start_tag(body: &mut String, element: &BytesStart<'_>, self_closing: bool) -> Result<()> {
    body.push('<');
    body.push_str(raw_str(element.name().local_name().into_inner())?);

    for attr in element.attributes() {
        let attr = attr.context("💀 Unparseable attribute inside a businesscard. The XML is having a moment.")?;
        let key = attr.key;
        if key.as_ref() == b"xmlns" || key.as_ref().starts_with(b"xmlns:") {
            // namespace declarations never make it into the fragment
            continue;
        }
        let key_out: &[u8] = match key.prefix() {
            // xml:lang and friends keep their reserved prefix
            Some(prefix) if prefix.as_ref() != b"xml" => key.local_name().into_inner(),
            _ => key.as_ref(),
        };
        body.push(' ');
        body.push_str(raw_str(key_out)?);
        body.push_str("=\"");
        body.push_str(raw_str(&attr.value)?);
        body.push('"');
    }

    body.push_str(if self_closing { "/>" } else { ">" });
    Ok(())
}

fn push_end_tag(body: &mut String, element: &BytesEnd<'_>) -> Result<()> {
    body.push_str("</");
    body.push_str(raw_str(element.name().local_name().into_inner())?);
    body.push('>');
    Ok(())
}

/// 🃏 Accumulates one record while its events stream past.
///
/// Depth bookkeeping is the whole trick: `begin` opens at depth 1, every
/// `Start` pushes, every `End` pops, and when the depth hits zero the record
/// is complete and [`CardCapture::into_card`] hands over the goods.
#[derive(Debug)]
pub(crate) struct CardCapture {
    depth: usize,
    body: String,
    country: Option<String>,
    entity_name: Option<String>,
    /// depth of the first `entity` element while it is still open
    entity_depth: Option<usize>,
    entity_seen: bool,
    /// depth of the first `regdate` element while we're collecting its text
    regdate_depth: Option<usize>,
    regdate_text: String,
    regdate_done: bool,
}

impl CardCapture {
    /// 🚀 Start capturing at the record's opening tag.
    pub(crate) fn begin(start: &BytesStart<'_>) -> Result<Self> {
        let mut capture = Self {
            depth: 1,
            body: String::new(),
            country: None,
            entity_name: None,
            entity_depth: None,
            entity_seen: false,
            regdate_depth: None,
            regdate_text: String::new(),
            regdate_done: false,
        };
        push_start_tag(&mut capture.body, start, false)?;
        Ok(capture)
    }

    /// 🫥 A self-closing `<businesscard/>`. No entity, no country, no future in
    /// the extracts — but it still counts as processed, so it still gets a Card.
    pub(crate) fn empty(start: &BytesStart<'_>) -> Result<Card> {
        let mut body = String::new();
        push_start_tag(&mut body, start, true)?;
        Ok(Card {
            country: None,
            date: None,
            entity_name: None,
            body,
        })
    }

    /// 🔄 Feed the next event. Returns `true` when the record's closing tag has
    /// been consumed and the capture is complete.
    pub(crate) fn handle(&mut self, event: &Event<'_>) -> Result<bool> {
        match event {
            Event::Start(e) => {
                self.depth += 1;
                self.observe_element(e, self.depth)?;
                push_start_tag(&mut self.body, e, false)?;
            }
            Event::Empty(e) => {
                // opens and closes in one event; depth is untouched
                self.observe_element(e, self.depth + 1)?;
                push_start_tag(&mut self.body, e, true)?;
                self.leave_element(self.depth + 1);
            }
            Event::End(e) => {
                push_end_tag(&mut self.body, e)?;
                self.leave_element(self.depth);
                self.depth -= 1;
                if self.depth == 0 {
                    return Ok(true);
                }
            }
            Event::Text(e) => {
                // raw form into the body so escapes survive byte-for-byte
                self.body.push_str(raw_str(e)?);
                if self.collecting_regdate() {
                    let text = e
                        .decode()
                        .context("💀 regdate text would not unescape. A date, feral.")?;
                    self.regdate_text.push_str(&text);
                }
            }
            Event::CData(e) => {
                self.body.push_str("<![CDATA[");
                self.body.push_str(raw_str(e)?);
                self.body.push_str("]]>");
                if self.collecting_regdate() {
                    self.regdate_text.push_str(raw_str(e)?);
                }
            }
            Event::GeneralRef(e) => {
                self.body.push('&');
                self.body.push_str(raw_str(e)?);
                self.body.push(';');
            }
            Event::Comment(e) => {
                self.body.push_str("<!--");
                self.body.push_str(raw_str(e)?);
                self.body.push_str("-->");
            }
            // declarations / PIs / doctypes have no business inside a record;
            // Eof is the stream driver's problem, not ours
            _ => {}
        }
        Ok(false)
    }

    /// 🏁 The record is complete — trim the collected date text down to its
    /// `YYYY-MM-DD` head (trailing time/timezone content is noise) and ship.
    pub(crate) fn into_card(self) -> Card {
        let trimmed = self.regdate_text.trim();
        let date = if trimmed.chars().count() >= 10 {
            Some(trimmed.chars().take(10).collect())
        } else {
            None
        };
        Card {
            country: self.country,
            date,
            entity_name: self.entity_name,
            body: self.body,
        }
    }

    fn collecting_regdate(&self) -> bool {
        self.regdate_depth.is_some() && !self.regdate_done
    }

    /// 👀 Field extraction, keyed on local names so prefixed and unprefixed
    /// spellings both match. Only firsts count: first entity, first regdate,
    /// first name inside that first entity.
    fn observe_element(&mut self, element: &BytesStart<'_>, element_depth: usize) -> Result<()> {
        match element.name().local_name().as_ref() {
            b"entity" if !self.entity_seen => {
                self.entity_seen = true;
                self.entity_depth = Some(element_depth);
                self.country = attr_lookup(element, b"countrycode")?;
            }
            b"name" => {
                let inside_entity = self
                    .entity_depth
                    .is_some_and(|entity_depth| element_depth > entity_depth);
                if inside_entity && self.entity_name.is_none() {
                    self.entity_name = attr_lookup(element, b"name")?;
                }
            }
            b"regdate" if !self.regdate_done && self.regdate_depth.is_none() => {
                self.regdate_depth = Some(element_depth);
            }
            _ => {}
        }
        Ok(())
    }

    fn leave_element(&mut self, element_depth: usize) {
        if self.entity_depth == Some(element_depth) {
            self.entity_depth = None;
        }
        if self.regdate_depth == Some(element_depth) {
            self.regdate_depth = None;
            self.regdate_done = true;
        }
    }
}
