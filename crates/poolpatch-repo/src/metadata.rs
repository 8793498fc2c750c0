//! Repository metadata parsing and validation
//!
//! Reads the `repodata/repomd.xml` index of a mirrored repository and the
//! gzip-compressed update-info document it points at.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use poolpatch_api::Guidance;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

use crate::error::RepoError;
use crate::types::{PackageRef, UpdateInfo, UpdateInfoIndex, UpdateInfoMetadata, update_info_file_name};

/// Resolves on-disk metadata paths under a mirror root
#[derive(Debug, Clone)]
pub struct MetadataStore {
    mirror_root: PathBuf,
}

impl MetadataStore {
    pub fn new(mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
        }
    }

    #[must_use]
    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    /// `<mirror_root>/<name>`
    #[must_use]
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.mirror_root.join(name)
    }

    /// `<mirror_root>/<name>/repodata/repomd.xml`
    #[must_use]
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.repo_dir(name).join("repodata").join("repomd.xml")
    }

    /// `<mirror_root>/<name>/<checksum>-updateinfo.xml.gz`
    #[must_use]
    pub fn update_info_path(&self, name: &str, checksum: &str) -> PathBuf {
        self.repo_dir(name).join(update_info_file_name(checksum))
    }

    /// Parse the metadata index of a mirrored repository
    ///
    /// # Errors
    /// Returns `RepoError::InvalidMetadata` if the index is missing or malformed
    pub fn load_index(&self, name: &str) -> Result<UpdateInfoMetadata, RepoError> {
        parse_metadata_index(&self.index_path(name))
    }

    /// Parse the staged update-info document for `checksum`
    ///
    /// # Errors
    /// Returns `RepoError::InvalidUpdateInfo` if the document is missing or malformed
    pub fn load_update_info(&self, name: &str, checksum: &str) -> Result<UpdateInfoIndex, RepoError> {
        parse_update_info(&self.update_info_path(name, checksum))
    }
}

/// Equality check between a recorded checksum and the one found on disk
///
/// # Errors
/// Returns `RepoError::ChecksumMismatch` if they differ
pub fn validate_checksum(expected: &str, actual: &str) -> Result<(), RepoError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RepoError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Parse `repomd.xml` from disk
///
/// # Errors
/// Returns `RepoError::InvalidMetadata` if the file is missing or malformed
#[instrument(level = "debug")]
pub fn parse_metadata_index(path: &Path) -> Result<UpdateInfoMetadata, RepoError> {
    let xml = std::fs::read_to_string(path)
        .map_err(|e| RepoError::InvalidMetadata(format!("{}: {e}", path.display())))?;
    parse_metadata_index_str(&xml)
}

/// Parse `repomd.xml` content and return its `updateinfo` entry
///
/// # Errors
/// Returns `RepoError::InvalidMetadata` on malformed XML or when the index
/// has no complete `updateinfo` entry
pub fn parse_metadata_index_str(xml: &str) -> Result<UpdateInfoMetadata, RepoError> {
    let invalid = |msg: String| RepoError::InvalidMetadata(msg);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_root = false;
    let mut in_updateinfo = false;
    let mut in_checksum = false;
    let mut checksum: Option<String> = None;
    let mut location: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| invalid(e.to_string()))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"repomd" => saw_root = true,
                b"data" => {
                    in_updateinfo = attribute(&e, b"type").map_err(invalid)?.as_deref()
                        == Some("updateinfo");
                }
                b"checksum" if in_updateinfo => in_checksum = true,
                b"location" if in_updateinfo => {
                    location = attribute(&e, b"href").map_err(invalid)?;
                }
                _ => {}
            },
            Event::Empty(e) => {
                if in_updateinfo && e.local_name().as_ref() == b"location" {
                    location = attribute(&e, b"href").map_err(invalid)?;
                }
            }
            Event::Text(t) if in_checksum => {
                let text = t.unescape().map_err(|e| invalid(e.to_string()))?;
                checksum = Some(text.trim().to_string());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"data" => in_updateinfo = false,
                b"checksum" => in_checksum = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(invalid("missing <repomd> root element".to_string()));
    }

    match (checksum, location) {
        (Some(checksum), Some(location)) if !checksum.is_empty() && !location.is_empty() => {
            debug!(%checksum, %location, "parsed metadata index");
            Ok(UpdateInfoMetadata { checksum, location })
        }
        _ => Err(invalid("no complete updateinfo entry".to_string())),
    }
}

/// Decompress and parse an update-info document from disk
///
/// # Errors
/// Returns `RepoError::InvalidUpdateInfo` if the file is missing, not gzip,
/// or malformed
#[instrument(level = "debug")]
pub fn parse_update_info(path: &Path) -> Result<UpdateInfoIndex, RepoError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RepoError::InvalidUpdateInfo(format!("{}: {e}", path.display())))?;
    parse_update_info_gz(&bytes)
}

/// Decompress and parse a gzip'd update-info document
///
/// # Errors
/// Returns `RepoError::InvalidUpdateInfo` if the bytes are not gzip or the
/// document is malformed
pub fn parse_update_info_gz(bytes: &[u8]) -> Result<UpdateInfoIndex, RepoError> {
    let mut xml = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut xml)
        .map_err(|e| RepoError::InvalidUpdateInfo(format!("decompression failed: {e}")))?;
    parse_update_info_str(&xml)
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Description,
    Severity,
    Recommended,
    Absolute,
}

#[derive(Debug, Default)]
struct UpdateBuilder {
    id: String,
    title: String,
    summary: String,
    description: String,
    update_type: String,
    severity: Option<String>,
    recommended: String,
    absolute: String,
    packages: Vec<PackageRef>,
}

impl UpdateBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Id => &mut self.id,
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
            Field::Description => &mut self.description,
            Field::Severity => self.severity.get_or_insert_with(String::new),
            // Repeated guidance elements accumulate into one list
            Field::Recommended => {
                self.recommended.push(' ');
                &mut self.recommended
            }
            Field::Absolute => {
                self.absolute.push(' ');
                &mut self.absolute
            }
        };
        target.push_str(text);
    }

    fn finish(self) -> Result<UpdateInfo, RepoError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(RepoError::InvalidUpdateInfo("update without <id>".to_string()));
        }
        let summary = if self.summary.trim().is_empty() {
            self.title.trim().to_string()
        } else {
            self.summary.trim().to_string()
        };

        Ok(UpdateInfo {
            recommended_guidance: parse_guidance_list(&id, &self.recommended)?,
            absolute_guidance: parse_guidance_list(&id, &self.absolute)?,
            id,
            summary,
            description: self.description.trim().to_string(),
            update_type: self.update_type,
            severity: self.severity.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            packages: self.packages,
        })
    }
}

fn parse_guidance_list(id: &str, raw: &str) -> Result<Vec<Guidance>, RepoError> {
    let mut guidance = Vec::new();
    for name in raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
    {
        let parsed: Guidance = name
            .parse()
            .map_err(|e| RepoError::InvalidUpdateInfo(format!("update {id}: {e}")))?;
        if !guidance.contains(&parsed) {
            guidance.push(parsed);
        }
    }
    Ok(guidance)
}

fn package_ref(e: &BytesStart<'_>) -> Result<PackageRef, RepoError> {
    let invalid = RepoError::InvalidUpdateInfo;
    let required = |name: &'static str| -> Result<String, RepoError> {
        attribute(e, name.as_bytes())
            .map_err(invalid)?
            .ok_or_else(|| RepoError::InvalidUpdateInfo(format!("<package> without {name}")))
    };

    Ok(PackageRef {
        name: required("name")?,
        arch: required("arch")?,
        epoch: attribute(e, b"epoch").map_err(invalid)?,
        version: required("version")?,
        release: required("release")?,
    })
}

/// Parse update-info XML into entries keyed by update id
///
/// # Errors
/// Returns `RepoError::InvalidUpdateInfo` on malformed XML, an update
/// without an id, or an unknown guidance name
pub fn parse_update_info_str(xml: &str) -> Result<UpdateInfoIndex, RepoError> {
    let invalid = |msg: String| RepoError::InvalidUpdateInfo(msg);

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_root = false;
    let mut updates: UpdateInfoIndex = HashMap::new();
    let mut current: Option<UpdateBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event().map_err(|e| invalid(e.to_string()))? {
            Event::Start(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"updates" => saw_root = true,
                    b"update" => {
                        current = Some(UpdateBuilder {
                            update_type: attribute(&e, b"type")
                                .map_err(invalid)?
                                .unwrap_or_default(),
                            ..UpdateBuilder::default()
                        });
                    }
                    b"package" => {
                        if let Some(update) = current.as_mut() {
                            update.packages.push(package_ref(&e)?);
                        }
                    }
                    other => {
                        field = match other {
                            b"id" => Some(Field::Id),
                            b"title" => Some(Field::Title),
                            b"summary" => Some(Field::Summary),
                            b"description" => Some(Field::Description),
                            b"severity" => Some(Field::Severity),
                            b"recommended_guidance" => Some(Field::Recommended),
                            b"absolute_guidance" => Some(Field::Absolute),
                            _ => None,
                        };
                    }
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"package"
                    && let Some(update) = current.as_mut()
                {
                    update.packages.push(package_ref(&e)?);
                }
            }
            Event::Text(t) => {
                if let (Some(update), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(|e| invalid(e.to_string()))?;
                    update.push_text(f, &text);
                }
            }
            Event::CData(t) => {
                if let (Some(update), Some(f)) = (current.as_mut(), field) {
                    update.push_text(f, &String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"update"
                    && let Some(update) = current.take()
                {
                    let info = update.finish()?;
                    updates.insert(info.id.clone(), info);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(invalid("missing <updates> root element".to_string()));
    }

    debug!(count = updates.len(), "parsed update-info document");
    Ok(updates)
}

/// Value of the attribute whose local name is `name`, unescaped
fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1712345678</revision>
  <data type="primary">
    <checksum type="sha256">1111</checksum>
    <location href="repodata/1111-primary.xml.gz"/>
  </data>
  <data type="updateinfo">
    <checksum type="sha256">abcd1234</checksum>
    <open-checksum type="sha256">ffff</open-checksum>
    <location href="repodata/abcd1234-updateinfo.xml.gz"/>
  </data>
</repomd>"#;

    const UPDATEINFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<updates>
  <update from="security@example.com" status="final" type="security" version="1">
    <id>XS-2024-0001</id>
    <title>xapi fixes</title>
    <summary>Toolstack fixes</summary>
    <description>Fixes a &lt;critical&gt; issue.</description>
    <severity>High</severity>
    <recommended_guidance>RestartToolstack</recommended_guidance>
    <absolute_guidance>RebootHost</absolute_guidance>
    <pkglist>
      <collection>
        <package name="xapi-core" arch="x86_64" epoch="0" version="1.249.3" release="1.xs8">
          <filename>xapi-core-1.249.3-1.xs8.x86_64.rpm</filename>
        </package>
      </collection>
    </pkglist>
  </update>
  <update type="bugfix">
    <id>XS-2024-0002</id>
    <title>qemu update</title>
    <recommended_guidance>RestartDeviceModel, EvacuateHost</recommended_guidance>
    <pkglist>
      <collection>
        <package name="qemu" arch="x86_64" version="4.2.1" release="5.xs8"/>
      </collection>
    </pkglist>
  </update>
</updates>"#;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_metadata_index() {
        let metadata = parse_metadata_index_str(REPOMD).unwrap();
        assert_eq!(metadata.checksum, "abcd1234");
        assert_eq!(metadata.location, "repodata/abcd1234-updateinfo.xml.gz");
        assert_eq!(metadata.expected_file_name(), "abcd1234-updateinfo.xml.gz");
    }

    #[test]
    fn test_metadata_index_mismatched_tags() {
        let result = parse_metadata_index_str(r#"<repomd><data type="updateinfo"></repomd>"#);
        assert!(matches!(result, Err(RepoError::InvalidMetadata(_))));
    }

    #[test]
    fn test_metadata_index_without_updateinfo() {
        let xml = r#"<repomd><data type="primary"><checksum>1</checksum><location href="p"/></data></repomd>"#;
        assert!(matches!(
            parse_metadata_index_str(xml),
            Err(RepoError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_metadata_index_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_metadata_index(&dir.path().join("repomd.xml"));
        assert!(matches!(result, Err(RepoError::InvalidMetadata(_))));
    }

    #[test]
    fn test_parse_update_info() {
        let index = parse_update_info_str(UPDATEINFO).unwrap();
        assert_eq!(index.len(), 2);

        let first = &index["XS-2024-0001"];
        assert_eq!(first.summary, "Toolstack fixes");
        assert_eq!(first.description, "Fixes a <critical> issue.");
        assert_eq!(first.update_type, "security");
        assert_eq!(first.severity.as_deref(), Some("High"));
        assert_eq!(first.recommended_guidance, vec![Guidance::RestartToolstack]);
        assert_eq!(first.absolute_guidance, vec![Guidance::RebootHost]);
        assert_eq!(first.packages.len(), 1);
        assert_eq!(first.packages[0].epoch.as_deref(), Some("0"));

        let second = &index["XS-2024-0002"];
        assert_eq!(second.summary, "qemu update");
        assert_eq!(
            second.recommended_guidance,
            vec![Guidance::RestartDeviceModel, Guidance::EvacuateHost]
        );
        assert!(second.absolute_guidance.is_empty());
        assert_eq!(second.packages[0].name, "qemu");
        assert!(second.packages[0].epoch.is_none());
    }

    #[test]
    fn test_parse_update_info_gz() {
        let index = parse_update_info_gz(&gzip(UPDATEINFO)).unwrap();
        assert!(index.contains_key("XS-2024-0002"));
    }

    #[test]
    fn test_update_info_not_gzip() {
        let result = parse_update_info_gz(UPDATEINFO.as_bytes());
        assert!(matches!(result, Err(RepoError::InvalidUpdateInfo(_))));
    }

    #[test]
    fn test_update_info_unknown_guidance() {
        let xml = "<updates><update><id>X</id><recommended_guidance>RebootTwice</recommended_guidance></update></updates>";
        assert!(matches!(
            parse_update_info_str(xml),
            Err(RepoError::InvalidUpdateInfo(_))
        ));
    }

    #[test]
    fn test_update_info_without_id() {
        let xml = "<updates><update type=\"bugfix\"><title>t</title></update></updates>";
        assert!(matches!(
            parse_update_info_str(xml),
            Err(RepoError::InvalidUpdateInfo(_))
        ));
    }

    #[test]
    fn test_update_info_missing_file() {
        let store = MetadataStore::new("/nonexistent/mirror");
        assert!(matches!(
            store.load_update_info("base", "abcd"),
            Err(RepoError::InvalidUpdateInfo(_))
        ));
    }

    #[test]
    fn test_store_paths() {
        let store = MetadataStore::new("/srv/mirror");
        assert_eq!(
            store.index_path("base"),
            PathBuf::from("/srv/mirror/base/repodata/repomd.xml")
        );
        assert_eq!(
            store.update_info_path("base", "abcd"),
            PathBuf::from("/srv/mirror/base/abcd-updateinfo.xml.gz")
        );
    }

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum("abcd", "abcd").is_ok());
        assert!(matches!(
            validate_checksum("abcd", "beef"),
            Err(RepoError::ChecksumMismatch { .. })
        ));
    }
}
