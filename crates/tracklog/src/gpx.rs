//! GPX 1.1 output.
//!
//! One `<trk>` per document with a single `<trkseg>`; every point becomes a
//! `<trkpt>` carrying `<ele>` and `<time>`. Coordinates are written exactly as
//! stored, without rounding.

use std::fmt::Display;
use std::sync::OnceLock;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::escape::partial_escape;
use quick_xml::Writer;
use regex::Regex;

use crate::error::{Error, Result};
use crate::track::{format_instant, Track};

/// MIME type of exported files.
pub const GPX_MIME_TYPE: &str = "application/gpx+xml";

/// Namespace of the GPX 1.1 schema.
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// Default `creator` attribute.
pub const DEFAULT_CREATOR: &str = "Location Tracker";

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

type XmlWriter = Writer<Vec<u8>>;

/// Render a track as a GPX 1.1 document.
///
/// Markup characters in the track name are escaped; quotes are kept as-is.
///
/// # Errors
///
/// Returns an error if the XML writer fails.
pub fn to_gpx(track: &Track, creator: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute(("creator", creator));
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    write(&mut writer, Event::Start(root))?;

    write(&mut writer, Event::Start(BytesStart::new("trk")))?;
    write_text_element(&mut writer, "name", &track.name)?;
    write(&mut writer, Event::Start(BytesStart::new("trkseg")))?;

    for point in &track.points {
        let lat = point.latitude.to_string();
        let lon = point.longitude.to_string();
        let mut trkpt = BytesStart::new("trkpt");
        trkpt.push_attribute(("lat", lat.as_str()));
        trkpt.push_attribute(("lon", lon.as_str()));
        write(&mut writer, Event::Start(trkpt))?;

        write_text_element(&mut writer, "ele", &point.elevation.to_string())?;
        write_text_element(&mut writer, "time", &format_instant(&point.timestamp))?;

        write(&mut writer, Event::End(BytesEnd::new("trkpt")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("trkseg")))?;
    write(&mut writer, Event::End(BytesEnd::new("trk")))?;
    write(&mut writer, Event::End(BytesEnd::new("gpx")))?;

    String::from_utf8(writer.into_inner()).map_err(gpx_error)
}

/// File name for an exported track.
///
/// Every character outside `[A-Za-z0-9]` becomes `_`, the result is
/// lower-cased and `.gpx` appended: `"Run #1!"` gives `"run__1_.gpx"`.
#[must_use]
pub fn export_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new("[^a-zA-Z0-9]").expect("file name pattern is valid"));

    format!(
        "{}.gpx",
        unsafe_chars.replace_all(name, "_").to_lowercase()
    )
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(gpx_error)
}

fn write_text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(tag)))?;
    // Only `<`, `>` and `&` are escaped in text content.
    write(
        writer,
        Event::Text(BytesText::from_escaped(partial_escape(text))),
    )?;
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn gpx_error(err: impl Display) -> Error {
    Error::Gpx {
        message: err.to_string(),
    }
}
