//! RDF/XML metadata parser.
//!
//! Walks the document once and collects every outermost `rdf:Description`.
//! Inside a description, the first `dcterms:description` and the first
//! `dcterms:created` timestamp win; every `dcterms:creator` and every
//! `dcterms:modified` timestamp is kept. Creator fields are looked up by
//! local name anywhere below the creator element, so both the
//! `rdf:Bag/rdf:li/vCard:n` layout and flatter variants are understood.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::NsReader;
use tracing::{debug, warn};

use super::timestamp::parse_w3cdtf;
use super::{Description, MetadataDocument, MetadataError, VCard, DCTERMS_NS, RDF_NS, VCARD_NS};
use crate::xml::{attr_value, namespace_uri, read_leaf_text, resolve_attribute, ResolvedName};

/// Which date element a `W3CDTF` value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateSlot {
    Created,
    Modified,
}

/// Description under construction.
#[derive(Debug, Default)]
struct DescriptionBuilder {
    depth: usize,
    about: String,
    description: Option<String>,
    creators: Vec<VCard>,
    created: Option<DateTime<Utc>>,
    modified: Vec<DateTime<Utc>>,
    creator: Option<(usize, VCard)>,
    date_slot: Option<(usize, DateSlot)>,
    failure: Option<String>,
}

impl DescriptionBuilder {
    fn new(depth: usize, about: String) -> Self {
        Self {
            depth,
            about,
            ..Default::default()
        }
    }

    fn finish(self) -> Result<Description, MetadataError> {
        if let Some(reason) = self.failure {
            return Err(MetadataError::Rejected {
                about: self.about,
                reason,
            });
        }
        Ok(Description {
            about: self.about,
            description: self.description.unwrap_or_default(),
            creators: self.creators,
            created: self.created.unwrap_or_else(Utc::now),
            modified: self.modified,
        })
    }

    fn record_timestamp(&mut self, text: &str) {
        let Some((_, slot)) = self.date_slot else {
            return;
        };
        match parse_w3cdtf(text) {
            Ok(timestamp) => match slot {
                DateSlot::Created => {
                    self.created.get_or_insert(timestamp);
                }
                DateSlot::Modified => self.modified.push(timestamp),
            },
            Err(e) => {
                if self.failure.is_none() {
                    self.failure = Some(e.to_string());
                }
            }
        }
    }

    fn record_creator_field(&mut self, local: &str, text: String) {
        let Some((_, card)) = self.creator.as_mut() else {
            return;
        };
        let field = match local {
            "family-name" => &mut card.family_name,
            "given-name" => &mut card.given_name,
            "email" => &mut card.email,
            "organization-name" => &mut card.organization,
            _ => return,
        };
        if field.is_empty() {
            *field = text;
        }
    }

    /// Close whatever sub-structure ends at `depth`.
    fn close(&mut self, depth: usize) {
        if matches!(self.creator, Some((d, _)) if d == depth) {
            if let Some((_, card)) = self.creator.take() {
                self.creators.push(card);
            }
        }
        if matches!(self.date_slot, Some((d, _)) if d == depth) {
            self.date_slot = None;
        }
    }
}

/// Parse an RDF/XML metadata document.
///
/// A malformed document is an error. A single description that cannot be
/// read (bad timestamp) is reported in [`MetadataDocument::rejected`] and
/// the rest are still returned.
pub fn decode_metadata(xml: &str) -> Result<MetadataDocument, MetadataError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut doc = MetadataDocument::default();
    let mut current: Option<DescriptionBuilder> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_resolved_event_into(&mut buf)
            .map(|(ns, event)| (namespace_uri(ns), event))
        {
            Ok((_, Event::Eof)) => break,
            Ok((namespace, Event::Start(ref e))) => {
                depth += 1;
                let name = ResolvedName::new(namespace, e.local_name());

                match current.as_mut() {
                    None => {
                        if name.is(RDF_NS, "Description") {
                            current = Some(DescriptionBuilder::new(depth, about_of(&reader, e)));
                        }
                    }
                    Some(builder) => match (name.namespace.as_deref(), name.local.as_str()) {
                        (Some(DCTERMS_NS), "description") if builder.description.is_none() => {
                            builder.description = Some(read_text(&mut reader, e)?);
                            depth -= 1;
                        }
                        (Some(DCTERMS_NS), "creator") => {
                            builder.creator = Some((depth, VCard::default()));
                        }
                        (Some(DCTERMS_NS), "created") => {
                            builder.date_slot = Some((depth, DateSlot::Created));
                        }
                        (Some(DCTERMS_NS), "modified") => {
                            builder.date_slot = Some((depth, DateSlot::Modified));
                        }
                        (Some(DCTERMS_NS), "W3CDTF") => {
                            let text = read_text(&mut reader, e)?;
                            builder.record_timestamp(&text);
                            depth -= 1;
                        }
                        (Some(VCARD_NS), local)
                            if builder.creator.is_some() && is_vcard_leaf(local) =>
                        {
                            let text = read_text(&mut reader, e)?;
                            builder.record_creator_field(local, text);
                            depth -= 1;
                        }
                        _ => {}
                    },
                }
            }
            Ok((namespace, Event::Empty(ref e))) => {
                let name = ResolvedName::new(namespace, e.local_name());
                match current.as_mut() {
                    None if name.is(RDF_NS, "Description") => {
                        let builder = DescriptionBuilder::new(depth + 1, about_of(&reader, e));
                        finish(&mut doc, builder);
                    }
                    Some(builder) if name.is(DCTERMS_NS, "creator") => {
                        builder.creators.push(VCard::default());
                    }
                    _ => {}
                }
            }
            Ok((_, Event::End(_))) => {
                if let Some(builder) = current.as_mut() {
                    builder.close(depth);
                    if builder.depth == depth {
                        if let Some(builder) = current.take() {
                            finish(&mut doc, builder);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(_) => {}
            Err(e) => {
                return Err(MetadataError::Xml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                });
            }
        }
        buf.clear();
    }

    debug!(
        "Decoded metadata: {} descriptions, {} rejected",
        doc.descriptions.len(),
        doc.rejected.len()
    );
    Ok(doc)
}

fn finish(doc: &mut MetadataDocument, builder: DescriptionBuilder) {
    match builder.finish() {
        Ok(description) => doc.descriptions.push(description),
        Err(e) => {
            warn!("Skipping description: {}", e);
            doc.rejected.push(e);
        }
    }
}

fn is_vcard_leaf(local: &str) -> bool {
    matches!(local, "family-name" | "given-name" | "email" | "organization-name")
}

/// `rdf:about`, falling back to an unprefixed `about`.
fn about_of(reader: &NsReader<&[u8]>, e: &BytesStart) -> String {
    let mut fallback = None;
    for attr in e.attributes().flatten() {
        let name = resolve_attribute(reader, &attr);
        if name.is(RDF_NS, "about") {
            return attr_value(&attr);
        }
        if name.namespace.is_none() && name.local == "about" {
            fallback = Some(attr_value(&attr));
        }
    }
    fallback.unwrap_or_default()
}

fn read_text(reader: &mut NsReader<&[u8]>, e: &BytesStart) -> Result<String, MetadataError> {
    read_leaf_text(reader, e).map_err(|err| MetadataError::Xml {
        position: reader.buffer_position(),
        message: err.to_string(),
    })
}
