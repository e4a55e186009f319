//! Backup document format of the in-memory provider
//!
//! One element per line, attributes double-quoted:
//!
//! ```text
//! <BackupDocument version="1" context="0x00000000">
//! <BackupState selectComponents="true" bootable="false" backupType="1" partialFiles="false"/>
//! <SnapshotSet id="{...}"/>
//! <Snapshot id="{...}" volume="C:\" device="..." attributes="0x00000001"/>
//! <Writer instance="{...}" class="{...}" name="..."/>
//! <Component type="2" name="..." selected="true" .../>
//! <Subcomponent path="..." name="..."/>
//! <AlternateLocation path="..." filespec="..." recursive="false" destination="..."/>
//! <NewTarget path="..." filespec="..." recursive="true" destination="..."/>
//! <RangesFile index="0" path="..."/>
//! </BackupDocument>
//! ```
//!
//! `Component` lines belong to the preceding `Writer`. `Subcomponent`,
//! `AlternateLocation`, `NewTarget` and `RangesFile` lines belong to the
//! preceding `Component`. Anything else is `INVALID_XML_DOCUMENT`.

use shadowset_core::codec::codes;
use shadowset_core::{
    to_guid, to_native_id, BackupState, BackupType, ComponentType, FileRestoreStatus,
    LocationMapping, NativeId, NativeResult, StatusCode, WriterComponent,
};
use std::collections::BTreeMap;
use uuid::Uuid;

const VERSION: &str = "1";

/// A snapshot recorded in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocSnapshot {
    pub(crate) id: NativeId,
    pub(crate) volume: String,
    pub(crate) device: String,
    pub(crate) attributes: u32,
}

/// A writer and its selected components
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocWriter {
    pub(crate) instance_id: NativeId,
    pub(crate) writer_id: NativeId,
    pub(crate) name: String,
    pub(crate) components: Vec<WriterComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Document {
    pub(crate) context: u32,
    pub(crate) backup_state: Option<BackupState>,
    pub(crate) snapshot_set: Option<NativeId>,
    pub(crate) snapshots: Vec<DocSnapshot>,
    pub(crate) writers: Vec<DocWriter>,
}

impl Document {
    pub(crate) fn render(&self) -> String {
        let mut out = format!(
            "<BackupDocument version=\"{}\" context=\"0x{:08x}\">\n",
            VERSION, self.context
        );
        if let Some(state) = &self.backup_state {
            out.push_str(&format!(
                "<BackupState selectComponents=\"{}\" bootable=\"{}\" backupType=\"{}\" partialFiles=\"{}\"/>\n",
                state.select_components,
                state.bootable_system_state,
                state.backup_type.as_raw(),
                state.partial_file_support
            ));
        }
        if let Some(set) = self.snapshot_set {
            out.push_str(&format!("<SnapshotSet id=\"{}\"/>\n", id_text(set)));
        }
        for snapshot in &self.snapshots {
            out.push_str(&format!(
                "<Snapshot id=\"{}\" volume=\"{}\" device=\"{}\" attributes=\"0x{:08x}\"/>\n",
                id_text(snapshot.id),
                escape(&snapshot.volume),
                escape(&snapshot.device),
                snapshot.attributes
            ));
        }
        for writer in &self.writers {
            out.push_str(&format!(
                "<Writer instance=\"{}\" class=\"{}\" name=\"{}\"/>\n",
                id_text(writer.instance_id),
                id_text(writer.writer_id),
                escape(&writer.name)
            ));
            for component in &writer.components {
                render_component(&mut out, component);
            }
        }
        out.push_str("</BackupDocument>\n");
        out
    }

    pub(crate) fn parse(text: &str) -> NativeResult<Self> {
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let header = lines.next().ok_or_else(invalid)?;
        let (tag, attrs) = element(header)?;
        if tag != "BackupDocument" || attrs.get("version").map(String::as_str) != Some(VERSION) {
            return Err(invalid());
        }
        let mut doc = Document {
            context: hex(&attrs, "context")?,
            ..Document::default()
        };

        let mut closed = false;
        for line in lines {
            if closed {
                return Err(invalid());
            }
            if line == "</BackupDocument>" {
                closed = true;
                continue;
            }
            let (tag, attrs) = element(line)?;
            match tag.as_str() {
                "BackupState" => {
                    doc.backup_state = Some(BackupState {
                        select_components: flag(&attrs, "selectComponents")?,
                        bootable_system_state: flag(&attrs, "bootable")?,
                        backup_type: BackupType::from_raw(number(&attrs, "backupType")?),
                        partial_file_support: flag(&attrs, "partialFiles")?,
                    });
                }
                "SnapshotSet" => doc.snapshot_set = Some(id(&attrs, "id")?),
                "Snapshot" => doc.snapshots.push(DocSnapshot {
                    id: id(&attrs, "id")?,
                    volume: text_attr(&attrs, "volume")?,
                    device: text_attr(&attrs, "device")?,
                    attributes: hex(&attrs, "attributes")?,
                }),
                "Writer" => doc.writers.push(DocWriter {
                    instance_id: id(&attrs, "instance")?,
                    writer_id: id(&attrs, "class")?,
                    name: text_attr(&attrs, "name")?,
                    components: Vec::new(),
                }),
                "Component" => {
                    let writer = doc.writers.last_mut().ok_or_else(invalid)?;
                    writer.components.push(parse_component(&attrs)?);
                }
                "Subcomponent" => doc
                    .last_component()?
                    .restore_subcomponents
                    .push((text_attr(&attrs, "path")?, text_attr(&attrs, "name")?)),
                "AlternateLocation" => doc
                    .last_component()?
                    .alternative_locations
                    .push(parse_mapping(&attrs)?),
                "NewTarget" => doc.last_component()?.new_targets.push(parse_mapping(&attrs)?),
                "RangesFile" => doc
                    .last_component()?
                    .ranges_files
                    .push((number(&attrs, "index")?, text_attr(&attrs, "path")?)),
                _ => return Err(invalid()),
            }
        }
        if !closed {
            return Err(invalid());
        }
        Ok(doc)
    }

    fn last_component(&mut self) -> NativeResult<&mut WriterComponent> {
        self.writers
            .last_mut()
            .and_then(|w| w.components.last_mut())
            .ok_or_else(invalid)
    }
}

fn render_component(out: &mut String, component: &WriterComponent) {
    out.push_str(&format!(
        "<Component type=\"{}\" name=\"{}\"",
        component.component_type.as_raw(),
        escape(&component.name)
    ));
    if let Some(path) = &component.logical_path {
        attr(out, "logicalPath", &escape(path));
    }
    attr(out, "selectable", component.selectable);
    attr(out, "selected", component.selected);
    if let Some(succeeded) = component.backup_succeeded {
        attr(out, "backupSucceeded", succeeded);
    }
    if let Some(options) = &component.backup_options {
        attr(out, "backupOptions", &escape(options));
    }
    if let Some(stamp) = &component.previous_backup_stamp {
        attr(out, "previousStamp", &escape(stamp));
    }
    attr(out, "selectedForRestore", component.selected_for_restore);
    attr(out, "additionalRestores", component.additional_restores);
    attr(out, "fileRestoreStatus", component.file_restore_status.as_raw());
    if let Some(options) = &component.restore_options {
        attr(out, "restoreOptions", &escape(options));
    }
    out.push_str("/>\n");

    for (path, name) in &component.restore_subcomponents {
        out.push_str(&format!(
            "<Subcomponent path=\"{}\" name=\"{}\"/>\n",
            escape(path),
            escape(name)
        ));
    }
    for mapping in &component.alternative_locations {
        render_mapping(out, "AlternateLocation", mapping);
    }
    for target in &component.new_targets {
        render_mapping(out, "NewTarget", target);
    }
    for (index, path) in &component.ranges_files {
        out.push_str(&format!(
            "<RangesFile index=\"{}\" path=\"{}\"/>\n",
            index,
            escape(path)
        ));
    }
}

fn render_mapping(out: &mut String, tag: &str, mapping: &LocationMapping) {
    out.push_str(&format!("<{}", tag));
    attr(out, "path", &escape(&mapping.path));
    attr(out, "filespec", &escape(&mapping.filespec));
    attr(out, "recursive", mapping.recursive);
    attr(out, "destination", &escape(&mapping.destination));
    out.push_str("/>\n");
}

/// Append ` name="value"`; `value` must already be escaped
fn attr(out: &mut String, name: &str, value: impl std::fmt::Display) {
    out.push_str(&format!(" {}=\"{}\"", name, value));
}

fn parse_component(attrs: &BTreeMap<String, String>) -> NativeResult<WriterComponent> {
    let mut component = WriterComponent::new(
        ComponentType::from_raw(number(attrs, "type")?),
        text_attr(attrs, "name")?,
    );
    component.logical_path = attrs.get("logicalPath").cloned();
    component.selectable = flag(attrs, "selectable")?;
    component.selected = flag(attrs, "selected")?;
    component.backup_succeeded = attrs
        .get("backupSucceeded")
        .map(|v| parse_bool(v))
        .transpose()?;
    component.backup_options = attrs.get("backupOptions").cloned();
    component.previous_backup_stamp = attrs.get("previousStamp").cloned();
    component.selected_for_restore = flag(attrs, "selectedForRestore")?;
    component.additional_restores = flag(attrs, "additionalRestores")?;
    component.file_restore_status =
        FileRestoreStatus::from_raw(number(attrs, "fileRestoreStatus")?);
    component.restore_options = attrs.get("restoreOptions").cloned();
    Ok(component)
}

fn parse_mapping(attrs: &BTreeMap<String, String>) -> NativeResult<LocationMapping> {
    Ok(LocationMapping {
        path: text_attr(attrs, "path")?,
        filespec: text_attr(attrs, "filespec")?,
        recursive: flag(attrs, "recursive")?,
        destination: text_attr(attrs, "destination")?,
    })
}

// =============================================================================
// Lexing
// =============================================================================

fn invalid() -> StatusCode {
    StatusCode(codes::INVALID_XML_DOCUMENT)
}

/// Split `<Tag a="x" b="y"/>` (or `<Tag ...>` for the root) into tag and attributes
fn element(line: &str) -> NativeResult<(String, BTreeMap<String, String>)> {
    let body = line.strip_prefix('<').ok_or_else(invalid)?;
    let body = body
        .strip_suffix("/>")
        .or_else(|| body.strip_suffix('>'))
        .ok_or_else(invalid)?;
    let (tag, mut rest) = match body.find(char::is_whitespace) {
        Some(at) => (&body[..at], &body[at..]),
        None => (body, ""),
    };
    if tag.is_empty() {
        return Err(invalid());
    }

    let mut attrs = BTreeMap::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let eq = rest.find('=').ok_or_else(invalid)?;
        let name = rest[..eq].trim();
        let value = rest[eq + 1..].strip_prefix('"').ok_or_else(invalid)?;
        let close = value.find('"').ok_or_else(invalid)?;
        if name.is_empty() || attrs.insert(name.to_string(), unescape(&value[..close])?).is_some() {
            return Err(invalid());
        }
        rest = &value[close + 1..];
    }
    Ok((tag.to_string(), attrs))
}

fn text_attr(attrs: &BTreeMap<String, String>, name: &str) -> NativeResult<String> {
    attrs.get(name).cloned().ok_or_else(invalid)
}

fn flag(attrs: &BTreeMap<String, String>, name: &str) -> NativeResult<bool> {
    parse_bool(attrs.get(name).ok_or_else(invalid)?)
}

fn parse_bool(value: &str) -> NativeResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid()),
    }
}

fn number(attrs: &BTreeMap<String, String>, name: &str) -> NativeResult<u32> {
    attrs
        .get(name)
        .and_then(|v| v.parse().ok())
        .ok_or_else(invalid)
}

fn hex(attrs: &BTreeMap<String, String>, name: &str) -> NativeResult<u32> {
    attrs
        .get(name)
        .and_then(|v| v.strip_prefix("0x"))
        .and_then(|v| u32::from_str_radix(v, 16).ok())
        .ok_or_else(invalid)
}

fn id(attrs: &BTreeMap<String, String>, name: &str) -> NativeResult<NativeId> {
    attrs
        .get(name)
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(to_native_id)
        .ok_or_else(invalid)
}

fn id_text(id: NativeId) -> String {
    to_guid(id).braced().to_string()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> NativeResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let end = rest[at..].find(';').ok_or_else(invalid)? + at;
        out.push(match &rest[at + 1..end] {
            "amp" => '&',
            "quot" => '"',
            "lt" => '<',
            "gt" => '>',
            "#10" => '\n',
            "#13" => '\r',
            _ => return Err(invalid()),
        });
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
