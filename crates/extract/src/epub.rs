//! EPUB package reading.
//!
//! An EPUB is a ZIP archive. `META-INF/container.xml` points at the OPF
//! package document, whose `<metadata>` block carries Dublin Core elements
//! (`dc:title`, `dc:creator`, ...). Both documents are parsed leniently with
//! the HTML parser, which keeps prefixed tag names such as `dc:title` intact
//! and shrugs off the malformed XML that real-world books are full of.

use std::io::{Cursor, Read};

use exn::{OptionExt, ResultExt};
use scraper::{ElementRef, Html};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ErrorKind, Result};
use crate::models::Metadata;
use crate::normalize;

const CONTAINER_PATH: &str = "META-INF/container.xml";
/// Neither document has any business being larger than this.
const MAX_DOCUMENT_BYTES: u64 = 4 * 1024 * 1024;

pub(crate) fn metadata(bytes: &[u8]) -> Result<Metadata> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::NotAnArchive)?;

    let container = Html::parse_document(&read_entry(&mut archive, CONTAINER_PATH)?);
    let package_path = elements(&container)
        .find(|el| el.value().name() == "rootfile")
        .and_then(|el| el.value().attr("full-path"))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .ok_or_raise(|| ErrorKind::MalformedPackage("container lists no rootfile"))?
        .to_string();

    let package = Html::parse_document(&read_entry(&mut archive, &package_path)?);
    let title = first_text(&package, "dc:title")
        .as_deref()
        .and_then(normalize::title)
        .ok_or_raise(|| ErrorKind::MissingField("title"))?;

    Ok(Metadata {
        title,
        author: normalize::author(primary_creator(&package).as_deref()),
        language: normalize::optional(first_text(&package, "dc:language").as_deref()),
        description: normalize::optional(first_text(&package, "dc:description").as_deref()),
        identifier: normalize::optional(first_text(&package, "dc:identifier").as_deref()),
    })
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => exn::bail!(ErrorKind::MissingEntry(name.to_string())),
        Err(err) => return Err(err).or_raise(|| ErrorKind::NotAnArchive),
    };
    let mut buffer = Vec::new();
    entry
        .take(MAX_DOCUMENT_BYTES)
        .read_to_end(&mut buffer)
        .or_raise(|| ErrorKind::MalformedPackage("archive entry could not be decompressed"))?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn elements(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document.root_element().descendants().filter_map(ElementRef::wrap)
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn first_text(document: &Html, name: &str) -> Option<String> {
    elements(document)
        .filter(|el| el.value().name() == name)
        .map(text_of)
        .find(|text| !text.trim().is_empty())
}

/// The first creator marked as an author (`opf:role="aut"`), falling back to
/// the first creator of any role.
fn primary_creator(document: &Html) -> Option<String> {
    let creators: Vec<ElementRef<'_>> = elements(document).filter(|el| el.value().name() == "dc:creator").collect();
    creators
        .iter()
        .find(|el| el.value().attr("opf:role").is_some_and(|role| role.eq_ignore_ascii_case("aut")))
        .or_else(|| creators.first())
        .map(|el| text_of(*el))
}
