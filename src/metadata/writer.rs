//! RDF/XML metadata writer.

use chrono::{DateTime, Utc};

use super::timestamp::format_w3cdtf;
use super::{Description, VCard, DCTERMS_NS, RDF_NS, VCARD_NS};
use crate::xml::escape;

/// Serialize one description as a standalone `rdf:RDF` document.
///
/// When the description has no modification dates, the current time is
/// written as the single `dcterms:modified` value. The input is left
/// untouched.
///
/// Creators without a given or family name are not written, so they are
/// missing from a decode of the output. Their email and organization are
/// lost with them.
pub fn encode_description(description: &Description) -> String {
    encode_description_at(description, Utc::now())
}

/// Like [`encode_description`], with an explicit "now" for the synthesized
/// modification date.
pub fn encode_description_at(description: &Description, now: DateTime<Utc>) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str(&format!(
        "<rdf:RDF xmlns:rdf=\"{}\" xmlns:dcterms=\"{}\" xmlns:vCard=\"{}\">\n",
        RDF_NS, DCTERMS_NS, VCARD_NS
    ));
    xml.push_str(&format!(
        "  <rdf:Description rdf:about=\"{}\">\n",
        escape(&description.about)
    ));
    xml.push_str(&format!(
        "    <dcterms:description>{}</dcterms:description>\n",
        escape(&description.description)
    ));

    for creator in description.creators.iter().filter(|c| c.has_content()) {
        write_creator(&mut xml, creator);
    }

    write_date(&mut xml, "created", &description.created);
    if description.modified.is_empty() {
        write_date(&mut xml, "modified", &now);
    } else {
        for modified in &description.modified {
            write_date(&mut xml, "modified", modified);
        }
    }

    xml.push_str("  </rdf:Description>\n");
    xml.push_str("</rdf:RDF>\n");
    xml
}

fn write_creator(xml: &mut String, creator: &VCard) {
    xml.push_str("    <dcterms:creator>\n");
    xml.push_str("      <rdf:Bag>\n");
    xml.push_str("        <rdf:li rdf:parseType=\"Resource\">\n");
    xml.push_str("          <vCard:n rdf:parseType=\"Resource\">\n");
    xml.push_str(&format!(
        "            <vCard:family-name>{}</vCard:family-name>\n",
        escape(&creator.family_name)
    ));
    xml.push_str(&format!(
        "            <vCard:given-name>{}</vCard:given-name>\n",
        escape(&creator.given_name)
    ));
    xml.push_str("          </vCard:n>\n");
    xml.push_str(&format!(
        "          <vCard:email>{}</vCard:email>\n",
        escape(&creator.email)
    ));
    xml.push_str("          <vCard:org rdf:parseType=\"Resource\">\n");
    xml.push_str(&format!(
        "            <vCard:organization-name>{}</vCard:organization-name>\n",
        escape(&creator.organization)
    ));
    xml.push_str("          </vCard:org>\n");
    xml.push_str("        </rdf:li>\n");
    xml.push_str("      </rdf:Bag>\n");
    xml.push_str("    </dcterms:creator>\n");
}

fn write_date(xml: &mut String, element: &str, timestamp: &DateTime<Utc>) {
    xml.push_str(&format!("    <dcterms:{} rdf:parseType=\"Resource\">\n", element));
    xml.push_str(&format!(
        "      <dcterms:W3CDTF>{}</dcterms:W3CDTF>\n",
        format_w3cdtf(timestamp)
    ));
    xml.push_str(&format!("    </dcterms:{}>\n", element));
}
