//! Package document (OPF) reading and patching.

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

static MANIFEST_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</(?:[A-Za-z][\w.-]*:)?manifest\s*>").unwrap());
static SPINE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</(?:[A-Za-z][\w.-]*:)?spine\s*>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Percent-decoded, relative to the package document.
    pub href: String,
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<String>,
}

impl Package {
    pub fn parse(opf: &str) -> Result<Self> {
        let mut reader = Reader::from_str(opf);
        let mut package = Package::default();
        loop {
            match reader.read_event().context("invalid package document")? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"item" => {
                        let id = attribute(&e, b"id")?.unwrap_or_default();
                        let href = attribute(&e, b"href")?.unwrap_or_default();
                        let media_type = attribute(&e, b"media-type")?.unwrap_or_default();
                        let href = urlencoding::decode(&href)
                            .map(|decoded| decoded.into_owned())
                            .unwrap_or(href);
                        package.manifest.push(ManifestItem { id, href, media_type });
                    }
                    b"itemref" => {
                        if let Some(idref) = attribute(&e, b"idref")? {
                            package.spine.push(idref);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(package)
    }

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// XHTML documents in reading order.
    pub fn spine_documents(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine
            .iter()
            .filter_map(|idref| self.item(idref))
            .filter(|item| item.media_type == "application/xhtml+xml")
    }

    pub fn first_image(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.media_type.starts_with("image/"))
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| anyhow!("invalid attribute: {err}"))?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Path of the package document named by `META-INF/container.xml`.
pub(crate) fn rootfile_path(container_xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(container_xml);
    loop {
        match reader.read_event().context("invalid container.xml")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => bail!("container.xml names no rootfile"),
            _ => {}
        }
    }
}

/// `image/<subtype>` for a file name.
pub fn media_type(filename: &str) -> String {
    let lower = filename.to_lowercase();
    let subtype = if lower.ends_with(".svg") {
        "svg+xml".to_string()
    } else if lower.ends_with(".png") {
        "png".to_string()
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "jpeg".to_string()
    } else if lower.ends_with(".webp") {
        "webp".to_string()
    } else {
        lower.rsplit_once('.').map_or(String::new(), |(_, ext)| ext.to_string())
    };
    format!("image/{subtype}")
}

/// Inserts manifest items and spine itemrefs before the closing tags,
/// skipping ids the package already declares.
pub(crate) fn patch(opf: &str, items: &[ManifestItem], spine: &[&str]) -> Result<String> {
    let existing = Package::parse(opf)?;
    let mut manifest_xml = String::new();
    for item in items.iter().filter(|item| existing.item(&item.id).is_none()) {
        manifest_xml.push_str(&format!(
            r#"<item href="{}" id="{}" media-type="{}"/>"#,
            inkgloss_core::escape_attr(&item.href),
            inkgloss_core::escape_attr(&item.id),
            item.media_type
        ));
    }
    let mut spine_xml = String::new();
    for idref in spine.iter().filter(|idref| !existing.spine.iter().any(|id| id == *idref)) {
        spine_xml.push_str(&format!(r#"<itemref idref="{}"/>"#, inkgloss_core::escape_attr(idref)));
    }

    let mut patched = opf.to_string();
    // Spine follows manifest, so patch it first to keep offsets valid.
    let spine_end = SPINE_END_RE
        .find(&patched)
        .ok_or_else(|| anyhow!("package document has no spine"))?
        .start();
    patched.insert_str(spine_end, &spine_xml);
    let manifest_end = MANIFEST_END_RE
        .find(&patched)
        .ok_or_else(|| anyhow!("package document has no manifest"))?
        .start();
    patched.insert_str(manifest_end, &manifest_xml);
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>
    <item id="c1" href="Text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="Styles/style.css" media-type="text/css"/>
    <item id="cover" href="Images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="css"/>
  </spine>
</package>"#;

    #[test]
    fn parses_manifest_and_spine() {
        let package = Package::parse(OPF).unwrap();
        let docs: Vec<&str> = package.spine_documents().map(|item| item.href.as_str()).collect();
        assert_eq!(docs, vec!["Text/chapter 1.xhtml"]);
        assert_eq!(package.first_image().unwrap().href, "Images/cover.jpg");
    }

    #[test]
    fn media_types_follow_extension() {
        assert_eq!(media_type("map.SVG"), "image/svg+xml");
        assert_eq!(media_type("a.jpg"), "image/jpeg");
        assert_eq!(media_type("a.webp"), "image/webp");
        assert_eq!(media_type("a.gif"), "image/gif");
    }

    #[test]
    fn patch_adds_items_once() {
        let items = [ManifestItem {
            id: "x_ray.xhtml".into(),
            href: "Text/x_ray.xhtml".into(),
            media_type: "application/xhtml+xml".into(),
        }];
        let once = patch(OPF, &items, &["x_ray.xhtml"]).unwrap();
        let twice = patch(&once, &items, &["x_ray.xhtml"]).unwrap();
        assert_eq!(once, twice);
        let package = Package::parse(&once).unwrap();
        assert_eq!(package.spine, vec!["c1", "css", "x_ray.xhtml"]);
        assert_eq!(package.item("x_ray.xhtml").unwrap().href, "Text/x_ray.xhtml");
    }

    #[test]
    fn rootfile_is_found() {
        let xml = r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;
        assert_eq!(rootfile_path(xml).unwrap(), "OEBPS/content.opf");
    }
}
