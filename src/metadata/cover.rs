// RidiSync - RIDI Books Library Export
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! EPUB cover image extraction
//!
//! # Lookup Order (first hit wins)
//! 1. `<meta name="cover" content="ID">` -> manifest item `ID`
//! 2. first `<item>` tag mentioning `cover-image` (EPUB 3 properties)
//! 3. manifest item whose id contains "cover" and is an image
//! 4. `<guide><reference type="cover">` (EPUB 2)
//! 5. manifest item whose href contains "cover" and is an image
//! 6. the first spine item, if it is an image
//! 7. the image entry with the smallest name outside `META-INF`
//!
//! A cover that points at an XHTML page is followed to its first `<img>`.
//! The result is a `data:` URI so a UI can show it without temp files.

use crate::book::BookFormat;
use crate::metadata::epub::{attr, parent_dir, parse_manifest, resolve_path, EpubArchive, ManifestItem};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref META_COVER: Regex = Regex::new(r#"(?i)<meta[^>]*name=["']cover["'][^>]*>"#).unwrap();
    static ref ANY_ITEM: Regex = Regex::new(r"(?i)<item[^>]+>").unwrap();
    static ref GUIDE_COVER: Regex = Regex::new(r#"(?i)<reference[^>]+type=["']cover["'][^>]*>"#).unwrap();
    static ref FIRST_ITEMREF: Regex = Regex::new(r#"(?i)<itemref[^>]+idref=["']([^"']+)["'][^>]*>"#).unwrap();
    static ref HTML_HREF: Regex = Regex::new(r"(?i)\.x?html?($|\?)").unwrap();
    static ref IMG_TAG: Regex = Regex::new(r"(?i)<img\s[^>]+>").unwrap();
    static ref IMAGE_ENTRY: Regex = Regex::new(r"(?i)\.(jpe?g|png|gif|webp)$").unwrap();
}

/// Parsed package document handed to each strategy
struct Package<'a> {
    opf: &'a str,
    manifest: &'a [ManifestItem],
}

type CoverStrategy = (&'static str, fn(&Package) -> Option<String>);

/// Href strategies, in priority order
const STRATEGIES: [CoverStrategy; 6] = [
    ("meta-cover", meta_cover),
    ("cover-image-property", cover_image_property),
    ("manifest-id", manifest_id),
    ("guide-reference", guide_reference),
    ("manifest-href", manifest_href),
    ("first-spine-image", first_spine_image),
];

/// Extract the cover of a decrypted book as a `data:image/...;base64,` URI
///
/// Only EPUB carries covers; PDF always yields `None`. Never fails.
pub fn extract_cover(format: BookFormat, data: &[u8]) -> Option<String> {
    match format {
        BookFormat::Epub => epub_cover(data),
        BookFormat::Pdf => None,
    }
}

fn epub_cover(data: &[u8]) -> Option<String> {
    let mut archive = EpubArchive::open(data).ok()?;
    let opf_path = archive.package_path()?;
    let opf_dir = parent_dir(&opf_path).to_string();
    let opf = archive.read_text(&opf_path)?;
    let manifest = parse_manifest(&opf);

    let package = Package {
        opf: &opf,
        manifest: &manifest,
    };
    let href = STRATEGIES.iter().find_map(|(name, strategy)| {
        let href = strategy(&package)?;
        debug!(strategy = *name, href = %href, "cover candidate");
        Some(href)
    });

    let image = match href {
        Some(href) => {
            let target = resolve_cover_target(&mut archive, &opf_dir, &href)?;
            archive.read(&target)?
        }
        None => {
            let name = smallest_image_entry(&archive)?;
            debug!(entry = %name, "cover from image scan");
            archive.read(&name)?
        }
    };

    Some(data_uri(&image))
}

fn meta_cover(package: &Package) -> Option<String> {
    let tag = META_COVER.find(package.opf)?;
    let id = attr(tag.as_str(), "content")?;
    manifest_lookup(package.manifest, &id)
        .map(|item| item.href.clone())
}

fn cover_image_property(package: &Package) -> Option<String> {
    ANY_ITEM
        .find_iter(package.opf)
        .map(|m| m.as_str())
        .filter(|tag| tag.contains("cover-image"))
        .find_map(|tag| attr(tag, "href"))
}

fn manifest_id(package: &Package) -> Option<String> {
    package
        .manifest
        .iter()
        .find(|item| item.id.to_lowercase().contains("cover") && item.is_image())
        .map(|item| item.href.clone())
}

fn guide_reference(package: &Package) -> Option<String> {
    let tag = GUIDE_COVER.find(package.opf)?;
    attr(tag.as_str(), "href")
}

fn manifest_href(package: &Package) -> Option<String> {
    package
        .manifest
        .iter()
        .find(|item| item.href.to_lowercase().contains("cover") && item.is_image())
        .map(|item| item.href.clone())
}

/// Only the first `<itemref>` is considered
fn first_spine_image(package: &Package) -> Option<String> {
    let caps = FIRST_ITEMREF.captures(package.opf)?;
    manifest_lookup(package.manifest, &caps[1])
        .filter(|item| item.is_image())
        .map(|item| item.href.clone())
}

fn manifest_lookup<'a>(manifest: &'a [ManifestItem], id: &str) -> Option<&'a ManifestItem> {
    manifest.iter().find(|item| item.id == id)
}

/// Turn a cover href into an archive path, following XHTML wrappers to their image
fn resolve_cover_target(archive: &mut EpubArchive, opf_dir: &str, href: &str) -> Option<String> {
    let path = resolve_path(opf_dir, href);
    if !HTML_HREF.is_match(&path) {
        return Some(path);
    }

    let html = archive.read_text(&path)?;
    let img = IMG_TAG.find(&html)?;
    let src = attr(img.as_str(), "src")?;
    Some(resolve_path(parent_dir(&path), &src))
}

fn smallest_image_entry(archive: &EpubArchive) -> Option<String> {
    archive
        .entry_names()
        .iter()
        .filter(|name| IMAGE_ENTRY.is_match(name) && !name.to_lowercase().contains("meta-inf"))
        .min()
        .cloned()
}

/// Image subtype from the leading magic bytes
pub fn sniff_image_mime(data: &[u8]) -> &'static str {
    match data {
        [0x89, 0x50, ..] => "png",
        [0x47, 0x49, ..] => "gif",
        [0x52, 0x49, ..] => "webp",
        _ => "jpeg",
    }
}

fn data_uri(image: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        sniff_image_mime(image),
        STANDARD.encode(image)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::epub::tests::{build_epub, container_xml};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-png";
    const GIF: &[u8] = b"GIF89a-fake";
    const JPEG: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";

    fn epub(opf: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let container = container_xml("OEBPS/content.opf");
        let mut entries: Vec<(&str, &[u8])> = vec![
            ("META-INF/container.xml", container.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
        ];
        entries.extend_from_slice(files);
        build_epub(&entries)
    }

    fn uri_of(image: &[u8]) -> String {
        data_uri(image)
    }

    #[test]
    fn test_meta_cover_beats_cover_image_property() {
        let opf = r#"<package><metadata><meta content="c1" name="cover"/></metadata>
            <manifest>
              <item id="prop" href="images/prop.gif" media-type="image/gif" properties="cover-image"/>
              <item id="c1" href="images/meta.png" media-type="image/png"/>
            </manifest></package>"#;
        let book = epub(opf, &[("OEBPS/images/prop.gif", GIF), ("OEBPS/images/meta.png", PNG)]);

        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(PNG)));
    }

    #[test]
    fn test_cover_image_property() {
        let opf = r#"<manifest>
              <item id="a" href="a.jpg" media-type="image/jpeg"/>
              <item properties="cover-image" id="b" href="b.gif" media-type="image/gif"/>
            </manifest>"#;
        let book = epub(opf, &[("OEBPS/a.jpg", JPEG), ("OEBPS/b.gif", GIF)]);
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(GIF)));
    }

    #[test]
    fn test_manifest_id_requires_image_type() {
        let opf = r#"<manifest>
              <item id="cover-page" href="text/cover.xhtml" media-type="application/xhtml+xml"/>
              <item id="MyCover" href="img/front.png" media-type="image/png"/>
            </manifest>"#;
        let book = epub(opf, &[("OEBPS/img/front.png", PNG)]);
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(PNG)));
    }

    #[test]
    fn test_guide_reference_follows_xhtml_to_img() {
        let opf = r#"<manifest>
              <item id="p1" href="text/title.xhtml" media-type="application/xhtml+xml"/>
            </manifest>
            <guide><reference type="cover" title="Cover" href="text/title.xhtml#top"/></guide>"#;
        let html = r#"<html><body><div><img alt="" src="../images/front.jpg"/></div></body></html>"#;
        let book = epub(
            opf,
            &[
                ("OEBPS/text/title.xhtml", html.as_bytes()),
                ("OEBPS/images/front.jpg", JPEG),
            ],
        );
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(JPEG)));
    }

    #[test]
    fn test_html_cover_page_without_img_yields_none() {
        let opf = r#"<manifest>
              <item id="p1" href="text/cover.xhtml" media-type="application/xhtml+xml"/>
              <item id="i1" href="images/plate.jpg" media-type="image/jpeg"/>
            </manifest>
            <guide><reference type="cover" href="text/cover.xhtml"/></guide>"#;
        let html = r#"<html><body><p>Cover</p></body></html>"#;
        let book = epub(
            opf,
            &[
                ("OEBPS/text/cover.xhtml", html.as_bytes()),
                ("OEBPS/images/plate.jpg", JPEG),
            ],
        );
        assert_eq!(extract_cover(BookFormat::Epub, &book), None);
    }

    #[test]
    fn test_manifest_href_contains_cover() {
        let opf = r#"<manifest>
              <item id="i1" href="Images/Book_Cover.GIF" media-type="image/gif"/>
            </manifest>"#;
        let book = epub(opf, &[("OEBPS/images/book_cover.gif", GIF)]);
        // lookup falls back to a case-insensitive match
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(GIF)));
    }

    #[test]
    fn test_first_spine_item_must_be_an_image() {
        let opf = r#"<manifest>
              <item id="p1" href="p1.png" media-type="image/png"/>
              <item id="t1" href="t1.xhtml" media-type="application/xhtml+xml"/>
            </manifest>
            <spine><itemref idref="p1"/><itemref idref="t1"/></spine>"#;
        let book = epub(opf, &[("OEBPS/p1.png", PNG)]);
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(PNG)));

        let text_first = r#"<manifest>
              <item id="t1" href="t1.xhtml" media-type="application/xhtml+xml"/>
              <item id="p1" href="zz.gif" media-type="image/gif"/>
            </manifest>
            <spine><itemref idref="t1"/><itemref idref="p1"/></spine>"#;
        // spine strategy misses, the image scan picks the only image
        let book = epub(text_first, &[("OEBPS/zz.gif", GIF)]);
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(GIF)));
    }

    #[test]
    fn test_image_scan_picks_smallest_name_outside_meta_inf() {
        let book = epub(
            "<manifest></manifest>",
            &[
                ("OEBPS/z.png", PNG),
                ("META-INF/a.jpg", JPEG),
                ("OEBPS/b.gif", GIF),
                ("OEBPS/a.txt", b"text"),
            ],
        );
        assert_eq!(extract_cover(BookFormat::Epub, &book), Some(uri_of(GIF)));
    }

    #[test]
    fn test_missing_target_yields_none() {
        let opf = r#"<manifest>
              <item id="cover" href="missing.jpg" media-type="image/jpeg"/>
            </manifest>"#;
        let book = epub(opf, &[("OEBPS/other.png", PNG)]);
        assert_eq!(extract_cover(BookFormat::Epub, &book), None);
    }

    #[test]
    fn test_pdf_and_garbage_have_no_cover() {
        assert_eq!(extract_cover(BookFormat::Pdf, b"%PDF-1.4"), None);
        assert_eq!(extract_cover(BookFormat::Epub, b"not a zip"), None);
    }

    #[test]
    fn test_mime_sniffing() {
        assert_eq!(sniff_image_mime(PNG), "png");
        assert_eq!(sniff_image_mime(GIF), "gif");
        assert_eq!(sniff_image_mime(b"RIFF....WEBP"), "webp");
        assert_eq!(sniff_image_mime(JPEG), "jpeg");
        assert_eq!(sniff_image_mime(b""), "jpeg");
        assert_eq!(uri_of(PNG), format!("data:image/png;base64,{}", STANDARD.encode(PNG)));
        assert!(uri_of(PNG).starts_with("data:image/png;base64,iVBORw0KGg"));
    }
}
