//! Test fixtures: ZIP bundles built on the fly.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;

use crate::config::BundleConfig;
use crate::manifest::MANIFEST_NS;

pub const SBML: &str = "http://identifiers.org/combine.specifications/sbml";

pub fn test_config(staging_root: &Path) -> BundleConfig {
    BundleConfig::default().with_staging_root(staging_root)
}

/// Write a ZIP with the given `(name, content)` files.
pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A canonical manifest listing `(location, format, master)` triples.
pub fn manifest_xml(contents: &[(&str, &str, bool)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<omexManifest xmlns=\"{}\">\n",
        MANIFEST_NS
    );
    for (location, format, master) in contents {
        xml.push_str(&format!(
            "  <content location=\"{}\" format=\"{}\" master=\"{}\"/>\n",
            location, format, master
        ));
    }
    xml.push_str("</omexManifest>\n");
    xml
}
