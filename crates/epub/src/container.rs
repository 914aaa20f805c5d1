use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use inkgloss_core::{FootnotePage, RegionId, TextRegion};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::opf::{self, media_type, ManifestItem, Package};

const MIMETYPE: &str = "mimetype";
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";
const CONTAINER_XML: &str = "META-INF/container.xml";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// An EPUB held fully in memory. Entries keep their archive order.
pub struct EpubContainer {
    path: PathBuf,
    entries: IndexMap<String, Vec<u8>>,
    opf_path: String,
    package: Package,
    /// Directories relative to the package document, with trailing slash or
    /// empty.
    xhtml_dir: String,
    image_dir: String,
    pages: Vec<String>,
    images: Vec<String>,
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..=idx])
}

impl EpubContainer {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("{} is not a zip archive", path.display()))?;

        let mut entries = IndexMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.insert(entry.name().to_string(), data);
        }

        let container_xml = entries
            .get(CONTAINER_XML)
            .ok_or_else(|| anyhow!("{} has no {CONTAINER_XML}", path.display()))?;
        let opf_path = opf::rootfile_path(std::str::from_utf8(container_xml)?)?;
        let opf_bytes = entries
            .get(&opf_path)
            .ok_or_else(|| anyhow!("package document {opf_path} is missing"))?;
        let package = Package::parse(std::str::from_utf8(opf_bytes)?)?;

        let xhtml_dir = package
            .spine_documents()
            .next()
            .map(|item| parent_dir(&item.href).to_string())
            .unwrap_or_default();
        let image_dir = package
            .first_image()
            .map(|item| parent_dir(&item.href).to_string())
            .unwrap_or_else(|| xhtml_dir.clone());
        debug!(opf = opf_path.as_str(), xhtml_dir = xhtml_dir.as_str(), image_dir = image_dir.as_str(), "epub opened");

        Ok(Self {
            path,
            entries,
            opf_path,
            package,
            xhtml_dir,
            image_dir,
            pages: Vec::new(),
            images: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn opf_dir(&self) -> &str {
        parent_dir(&self.opf_path)
    }

    fn entry_name(&self, href: &str) -> String {
        format!("{}{href}", self.opf_dir())
    }

    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Archive names of the XHTML documents in reading order.
    pub fn documents(&self) -> Vec<String> {
        self.package
            .spine_documents()
            .map(|item| self.entry_name(&item.href))
            .collect()
    }

    /// One text region per spine document, identified by its archive name.
    pub fn regions(&self) -> Result<Vec<TextRegion>> {
        self.documents()
            .into_iter()
            .map(|name| {
                let bytes = self
                    .entries
                    .get(&name)
                    .ok_or_else(|| anyhow!("spine document {name} is missing"))?;
                let text = std::str::from_utf8(bytes).with_context(|| format!("{name} is not UTF-8"))?;
                Ok(TextRegion::extract(name.as_str(), text))
            })
            .collect()
    }

    /// Where each region starts when the regions are laid end to end.
    pub fn region_offsets(regions: &[TextRegion]) -> HashMap<RegionId, usize> {
        let mut offset = 0;
        regions
            .iter()
            .map(|region| {
                let start = offset;
                offset += region.text.len();
                (region.id.clone(), start)
            })
            .collect()
    }

    /// Path from a generated page to the image folder.
    pub fn image_prefix(&self) -> String {
        let depth = self.xhtml_dir.matches('/').count();
        format!("{}{}", "../".repeat(depth), self.image_dir)
    }

    pub fn replace_document(&mut self, name: &str, text: String) -> Result<()> {
        let Some(slot) = self.entries.get_mut(name) else {
            bail!("no document named {name}");
        };
        *slot = text.into_bytes();
        Ok(())
    }

    pub fn add_page(&mut self, page: &FootnotePage) {
        let name = self.entry_name(&format!("{}{}", self.xhtml_dir, page.filename));
        self.entries.insert(name, page.xhtml.clone().into_bytes());
        if !self.pages.contains(&page.filename) {
            self.pages.push(page.filename.clone());
        }
    }

    pub fn add_image(&mut self, filename: &str, data: Vec<u8>) {
        let name = self.entry_name(&format!("{}{filename}", self.image_dir));
        self.entries.insert(name, data);
        if !self.images.iter().any(|image| image == filename) {
            self.images.push(filename.to_string());
        }
    }

    /// Declares added pages and images in the manifest and appends the
    /// pages to the spine.
    pub fn patch_opf(&mut self) -> Result<()> {
        let mut items: Vec<ManifestItem> = self
            .pages
            .iter()
            .map(|page| ManifestItem {
                id: page.clone(),
                href: format!("{}{page}", self.xhtml_dir),
                media_type: XHTML_MEDIA_TYPE.to_string(),
            })
            .collect();
        items.extend(self.images.iter().map(|image| ManifestItem {
            id: image.clone(),
            href: format!("{}{image}", self.image_dir),
            media_type: media_type(image),
        }));
        let spine: Vec<&str> = self.pages.iter().map(String::as_str).collect();

        let opf = self
            .entries
            .get(&self.opf_path)
            .ok_or_else(|| anyhow!("package document {} is missing", self.opf_path))?;
        let patched = opf::patch(std::str::from_utf8(opf)?, &items, &spine)?;
        self.package = Package::parse(&patched)?;
        self.entries.insert(self.opf_path.clone(), patched.into_bytes());
        Ok(())
    }

    /// Repacks into a temporary file next to the book, then renames it over
    /// the original.
    pub fn write_atomic(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        {
            let mut writer = ZipWriter::new(BufWriter::new(tmp.as_file()));
            let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
            let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

            writer.start_file(MIMETYPE, stored)?;
            writer.write_all(self.entries.get(MIMETYPE).map_or(EPUB_MIMETYPE, Vec::as_slice))?;
            for (name, data) in self.entries.iter().filter(|(name, _)| name.as_str() != MIMETYPE) {
                writer.start_file(name.as_str(), deflated)?;
                writer.write_all(data)?;
            }
            writer.finish()?.flush()?;
        }
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(path = %self.path.display(), pages = self.pages.len(), images = self.images.len(), "epub written");
        Ok(())
    }

    /// Copies an image file from disk into the container.
    pub fn add_image_file(&mut self, filename: &str, source: &Path) -> Result<()> {
        let data = fs::read(source).with_context(|| format!("failed to read image {}", source.display()))?;
        self.add_image(filename, data);
        Ok(())
    }
}
