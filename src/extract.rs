//! Path extraction over one stored document.
//!
//! Walks the XML as a stream and yields one [`VehicleTuple`] per
//! `Vehicle` element, in document order, holding the identifier plus the
//! values at the requested [`VehicleField`] paths. Only those values are
//! kept; the rest of the document is discarded as it is read.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::encode::tag;
use crate::error::ExtractionFault;

/// A fixed logical path inside a vehicle document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleField {
    Identifier,
    Designation,
    Price,
    Category,
    Odometer,
    City,
}

impl VehicleField {
    pub fn path(&self) -> &'static str {
        match self {
            VehicleField::Identifier => "/VehicleReport/Stock/Vehicle/@InternalId",
            VehicleField::Designation => "/VehicleReport/Stock/Vehicle/Identification/Designation",
            VehicleField::Price => "/VehicleReport/Stock/Vehicle/Identification/Price",
            VehicleField::Category => "/VehicleReport/Stock/Vehicle/Identification/Category",
            VehicleField::Odometer => "/VehicleReport/Stock/Vehicle/UsageHistory/Odometer",
            VehicleField::City => "/VehicleReport/Stock/Vehicle/Geography/City",
        }
    }

    /// `(group, leaf)` element names below `Vehicle`; `None` for the
    /// identifier attribute.
    fn element(&self) -> Option<(&'static str, &'static str)> {
        match self {
            VehicleField::Identifier => None,
            VehicleField::Designation => Some((tag::IDENTIFICATION, tag::DESIGNATION)),
            VehicleField::Price => Some((tag::IDENTIFICATION, tag::PRICE)),
            VehicleField::Category => Some((tag::IDENTIFICATION, tag::CATEGORY)),
            VehicleField::Odometer => Some((tag::USAGE_HISTORY, tag::ODOMETER)),
            VehicleField::City => Some((tag::GEOGRAPHY, tag::CITY)),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, VehicleField::Price | VehicleField::Odometer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

/// Values extracted for one vehicle, parallel to the requested fields.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTuple {
    pub identifier: String,
    pub values: Vec<FieldValue>,
}

impl VehicleTuple {
    /// Text at position `i`; numbers yield an empty string.
    pub fn text(&self, i: usize) -> &str {
        match self.values.get(i) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Number at position `i`; text yields 0.
    pub fn number(&self, i: usize) -> f64 {
        match self.values.get(i) {
            Some(FieldValue::Number(n)) => *n,
            _ => 0.0,
        }
    }
}

/// Extract `fields` for every vehicle in `document`.
///
/// Any fault (malformed XML, a missing value, a non-numeric number) fails the
/// whole document; callers treat that as the row contributing nothing.
pub fn extract_vehicles(
    document: &str,
    fields: &[VehicleField],
) -> Result<Vec<VehicleTuple>, ExtractionFault> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);
    let mut walker = Walker::new(fields);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => walker.start(&e)?,
            Ok(Event::Empty(e)) => {
                walker.start(&e)?;
                walker.end()?;
            }
            Ok(Event::End(_)) => walker.end()?,
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(malformed)?;
                walker.text(&text);
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                walker.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }

    if !walker.stack.is_empty() {
        return Err(ExtractionFault::Malformed(
            "unexpected end of document".to_string(),
        ));
    }
    Ok(walker.out)
}

fn malformed(e: impl std::fmt::Display) -> ExtractionFault {
    ExtractionFault::Malformed(e.to_string())
}

struct Pending {
    identifier: Option<String>,
    values: Vec<Option<String>>,
    active: Option<usize>,
}

struct Walker<'f> {
    fields: &'f [VehicleField],
    stack: Vec<Vec<u8>>,
    current: Option<Pending>,
    seen: usize,
    out: Vec<VehicleTuple>,
}

impl<'f> Walker<'f> {
    fn new(fields: &'f [VehicleField]) -> Self {
        Self {
            fields,
            stack: Vec::new(),
            current: None,
            seen: 0,
            out: Vec::new(),
        }
    }

    fn at(&self, depth: usize, name: &str) -> bool {
        self.stack.get(depth).map(|n| n.as_slice()) == Some(name.as_bytes())
    }

    fn in_vehicle(&self) -> bool {
        self.at(0, tag::ROOT) && self.at(1, tag::STOCK) && self.at(2, tag::VEHICLE)
    }

    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), ExtractionFault> {
        self.stack.push(e.name().as_ref().to_vec());

        if self.stack.len() == 3 && self.in_vehicle() {
            let mut identifier = None;
            for attr in e.attributes() {
                let attr = attr.map_err(malformed)?;
                if attr.key.as_ref() == tag::INTERNAL_ID.as_bytes() {
                    identifier = Some(attr.unescape_value().map_err(malformed)?.into_owned());
                }
            }
            self.current = Some(Pending {
                identifier,
                values: vec![None; self.fields.len()],
                active: None,
            });
            return Ok(());
        }

        if self.stack.len() == 5 {
            let group = &self.stack[3];
            let leaf = &self.stack[4];
            let hit = self.fields.iter().position(|f| {
                f.element().is_some_and(|(g, l)| {
                    g.as_bytes() == group.as_slice() && l.as_bytes() == leaf.as_slice()
                })
            });
            if let (Some(i), Some(pending)) = (hit, self.current.as_mut()) {
                pending.active = Some(i);
                if !self.fields[i].is_numeric() {
                    pending.values[i].get_or_insert_with(String::new);
                }
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(pending) = self.current.as_mut() {
            if let Some(i) = pending.active {
                pending.values[i]
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
        }
    }

    fn end(&mut self) -> Result<(), ExtractionFault> {
        match self.stack.len() {
            5 => {
                if let Some(pending) = self.current.as_mut() {
                    pending.active = None;
                }
            }
            3 if self.in_vehicle() => {
                if let Some(pending) = self.current.take() {
                    let tuple = self.finish_vehicle(pending)?;
                    self.out.push(tuple);
                }
                self.seen += 1;
            }
            _ => {}
        }
        self.stack.pop();
        Ok(())
    }

    fn finish_vehicle(&self, pending: Pending) -> Result<VehicleTuple, ExtractionFault> {
        let index = self.seen;
        let identifier = pending
            .identifier
            .ok_or(ExtractionFault::MissingValue {
                index,
                path: VehicleField::Identifier.path(),
            })?;

        let mut values = Vec::with_capacity(self.fields.len());
        for (field, raw) in self.fields.iter().zip(pending.values) {
            let value = match field {
                VehicleField::Identifier => FieldValue::Text(identifier.clone()),
                f if f.is_numeric() => {
                    let raw = raw.ok_or(ExtractionFault::MissingValue {
                        index,
                        path: f.path(),
                    })?;
                    let n: f64 = raw.trim().parse().map_err(|_| ExtractionFault::NotANumber {
                        index,
                        path: f.path(),
                        value: raw.clone(),
                    })?;
                    FieldValue::Number(n)
                }
                f => FieldValue::Text(raw.ok_or(ExtractionFault::MissingValue {
                    index,
                    path: f.path(),
                })?),
            };
            values.push(value);
        }

        Ok(VehicleTuple { identifier, values })
    }
}
