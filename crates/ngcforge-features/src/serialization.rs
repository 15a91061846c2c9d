//! Project file format
//!
//! A `<lcnc-ncam>` root holding `feature` elements. Feature fields and text
//! blocks are element attributes; parameters are child `param` elements, and
//! an items parameter nests further `feature` elements. Each feature also
//! carries its tree `path` plus the expansion and selection hints, which are
//! consumed on load.

use std::borrow::Cow;
use std::collections::BTreeSet;

use ngcforge_core::{Error, ParseError, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use crate::feature::FeatureInstance;
use crate::param::Parameter;
use crate::template::TextBlocks;
use crate::tree::{Document, InsertAt, NodeId};

pub const ROOT_TAG: &str = "lcnc-ncam";

const HINT_KEYS: [&str; 4] = ["path", "expanded", "selected", "short_id"];
const FIELD_KEYS: [&str; 7] = ["type", "id", "name", "version", "src", "value", "indent"];

/// View state written alongside the tree, addressed by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub expanded: BTreeSet<String>,
    pub selected: Option<String>,
}

fn project_error(reason: impl Into<String>) -> Error {
    Error::Parse(ParseError::Project {
        reason: reason.into(),
    })
}

/// Attribute escaping that also keeps line breaks and tabs intact
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

fn push_attr(elem: &mut BytesStart<'_>, key: &str, value: &str) {
    elem.push_attribute(Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_attr(value).into_bytes()),
    });
}

fn write_event<'e>(writer: &mut Writer<Vec<u8>>, event: impl Into<Event<'e>>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::other(format!("failed to write project: {}", e)))
}

fn write_feature(
    writer: &mut Writer<Vec<u8>>,
    doc: &Document,
    node: NodeId,
    ui: &UiState,
) -> Result<()> {
    let Some(feature) = doc.feature(node) else {
        return Ok(());
    };
    let path = doc.path_of(node).unwrap_or_default();

    let mut elem = BytesStart::new("feature");
    push_attr(&mut elem, "type", &feature.type_id);
    push_attr(&mut elem, "id", &feature.id);
    push_attr(&mut elem, "name", &feature.name);
    push_attr(&mut elem, "version", &feature.version);
    if let Some(src) = &feature.src {
        push_attr(&mut elem, "src", src);
    }
    if !feature.value.is_empty() {
        push_attr(&mut elem, "value", &feature.value);
    }
    if feature.indent > 0 {
        push_attr(&mut elem, "indent", &feature.indent.to_string());
    }
    push_attr(&mut elem, "path", &path);
    if ui.expanded.contains(&path) {
        push_attr(&mut elem, "expanded", "True");
    }
    if ui.selected.as_deref() == Some(path.as_str()) {
        push_attr(&mut elem, "selected", "True");
    }
    for (key, value) in &feature.attrs {
        push_attr(&mut elem, key, value);
    }
    for (key, text) in feature.blocks.entries() {
        if !text.is_empty() {
            push_attr(&mut elem, key, text);
        }
    }
    write_event(writer, Event::Start(elem))?;

    for param in &feature.params {
        let mut pelem = BytesStart::new("param");
        for (key, value) in param.attrs() {
            push_attr(&mut pelem, &key, &value);
        }
        if param.children.is_empty() {
            write_event(writer, Event::Empty(pelem))?;
        } else {
            write_event(writer, Event::Start(pelem))?;
            for &child in &param.children {
                write_feature(writer, doc, child, ui)?;
            }
            write_event(writer, Event::End(BytesEnd::new("param")))?;
        }
    }
    write_event(writer, Event::End(BytesEnd::new("feature")))
}

/// Serialize a document with its view hints
pub fn to_text(doc: &Document, ui: &UiState) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_event(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    write_event(&mut writer, Event::Start(BytesStart::new(ROOT_TAG)))?;
    for &root in doc.roots() {
        write_feature(&mut writer, doc, root, ui)?;
    }
    write_event(&mut writer, Event::End(BytesEnd::new(ROOT_TAG)))?;
    let mut text = String::from_utf8(writer.into_inner())
        .map_err(|e| Error::other(format!("project text is not utf-8: {}", e)))?;
    text.push('\n');
    Ok(text)
}

/// Generic element tree read before the document is rebuilt
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn children_named<'e>(&'e self, name: &'e str) -> impl Iterator<Item = &'e Element> + 'e {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn element(start: &BytesStart<'_>) -> Result<Element> {
    let mut elem = Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| project_error(format!("bad attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| project_error(format!("bad value for '{}': {}", key, e)))?
            .into_owned();
        elem.attrs.push((key, value));
    }
    Ok(elem)
}

fn read_elements(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut stack = vec![Element::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element(&e)?),
            Ok(Event::Empty(e)) => {
                let elem = element(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(elem);
                }
            }
            Ok(Event::End(_)) => {
                let elem = stack.pop();
                match (elem, stack.last_mut()) {
                    (Some(elem), Some(parent)) => parent.children.push(elem),
                    _ => return Err(project_error("unbalanced closing tag")),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(project_error(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    if stack.len() != 1 {
        return Err(project_error("unexpected end of document"));
    }
    stack
        .pop()
        .ok_or_else(|| project_error("empty document"))
}

fn truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

fn feature_from_element(elem: &Element) -> Result<FeatureInstance> {
    let type_id = elem
        .attr("type")
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| project_error("feature without a type"))?;
    let mut feature = FeatureInstance {
        type_id: type_id.to_string(),
        id: elem.attr("id").unwrap_or_default().to_string(),
        name: elem.attr("name").unwrap_or(type_id).to_string(),
        version: elem.attr("version").unwrap_or("0").to_string(),
        src: elem.attr("src").map(str::to_string),
        value: elem.attr("value").unwrap_or_default().to_string(),
        indent: ngcforge_core::units::int_or_zero(elem.attr("indent").unwrap_or("0")).max(0)
            as usize,
        blocks: TextBlocks::default(),
        ..FeatureInstance::default()
    };
    for (key, value) in &elem.attrs {
        if FIELD_KEYS.contains(&key.as_str()) || HINT_KEYS.contains(&key.as_str()) {
            continue;
        }
        match feature.blocks.get_mut(key) {
            Some(slot) => *slot = value.clone(),
            None => {
                feature.attrs.insert(key.clone(), value.clone());
            }
        }
    }
    for (idx, pelem) in elem.children_named("param").enumerate() {
        let fallback = format!("param_{}", idx);
        let id = pelem.attr("id").unwrap_or(&fallback);
        feature.params.push(Parameter::from_attrs(
            id,
            pelem.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ));
    }
    Ok(feature)
}

fn build(
    doc: &mut Document,
    elem: &Element,
    owner: Option<(NodeId, usize)>,
    ui: &mut UiState,
) -> Result<()> {
    let feature = feature_from_element(elem)?;
    let node = match owner {
        None => Some(doc.insert_feature(feature, InsertAt::End)),
        Some((parent, param)) => doc.push_child(parent, param, feature),
    };
    let Some(node) = node else {
        warn!("Dropping feature nested in a non-items parameter");
        return Ok(());
    };
    let path = doc.path_of(node).unwrap_or_default();
    if truthy(elem.attr("expanded")) {
        ui.expanded.insert(path.clone());
    }
    if truthy(elem.attr("selected")) {
        ui.selected = Some(path);
    }
    for (idx, pelem) in elem.children_named("param").enumerate() {
        for child in pelem.children_named("feature") {
            build(doc, child, Some((node, idx)), ui)?;
        }
    }
    Ok(())
}

/// Rebuild a document from project text; short ids start over
pub fn from_text(text: &str) -> Result<(Document, UiState)> {
    let top = read_elements(text)?;
    let root = top
        .children_named(ROOT_TAG)
        .next()
        .ok_or_else(|| project_error(format!("missing <{}> root element", ROOT_TAG)))?;
    let mut doc = Document::new();
    let mut ui = UiState::default();
    for elem in root.children_named("feature") {
        build(&mut doc, elem, None, &mut ui)?;
    }
    debug!("Read project with {} features", doc.len());
    Ok((doc, ui))
}
