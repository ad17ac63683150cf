//! Schema validation of encoded documents.
//!
//! The ingest pipeline only depends on the [`SchemaValidator`] trait, so a
//! full XSD engine can be plugged in by embedders. [`StructuralValidator`]
//! is the built-in default: it checks the header attributes, the presence of
//! the provenance and stock sections, and the type of every vehicle leaf.

use std::collections::HashMap;

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::encode::tag;
use crate::error::SchemaValidationError;

/// Validates an encoded document before it is persisted.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, xml: &str) -> Result<(), SchemaValidationError>;
}

/// Accepts every document. Used when `ingest.validate_schema = false`.
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(&self, _xml: &str) -> Result<(), SchemaValidationError> {
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LeafKind {
    Text,
    Integer,
    PositiveDecimal,
}

const VEHICLE_LEAVES: &[(&str, &str, LeafKind)] = &[
    (tag::IDENTIFICATION, tag::DESIGNATION, LeafKind::Text),
    (tag::IDENTIFICATION, tag::PRICE, LeafKind::PositiveDecimal),
    (tag::IDENTIFICATION, tag::YEAR, LeafKind::Integer),
    (tag::IDENTIFICATION, tag::CATEGORY, LeafKind::Text),
    (tag::TECHNICAL, tag::DISPLACEMENT, LeafKind::Integer),
    (tag::TECHNICAL, tag::ENGINE_POWER, LeafKind::Integer),
    (tag::TECHNICAL, tag::FUEL_TYPE, LeafKind::Text),
    (tag::TECHNICAL, tag::TRANSMISSION, LeafKind::Text),
    (tag::USAGE_HISTORY, tag::ODOMETER, LeafKind::Integer),
    (tag::GEOGRAPHY, tag::CITY, LeafKind::Text),
];

/// Built-in structural validator for the vehicle report format.
#[derive(Debug, Default, Clone)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaValidator for StructuralValidator {
    fn validate(&self, xml: &str) -> Result<(), SchemaValidationError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut saw_provenance = false;
        let mut saw_stock = false;
        let mut vehicle: Option<VehicleCheck> = None;
        let mut vehicle_index = 0usize;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| SchemaValidationError::Malformed(e.to_string()))?;
            let (start, empty) = match &event {
                Event::Start(e) => (Some(e), false),
                Event::Empty(e) => (Some(e), true),
                _ => (None, false),
            };

            if let Some(e) = start {
                let name = element_name(e)?;
                match stack.len() {
                    0 => check_root(&name, e)?,
                    1 if name == tag::PROVENANCE => {
                        require_attr(e, tag::PROVENANCE, tag::VALIDATED_BY)?;
                        require_attr(e, tag::PROVENANCE, tag::REQUESTED_BY)?;
                        saw_provenance = true;
                    }
                    1 if name == tag::STOCK => saw_stock = true,
                    2 if name == tag::VEHICLE && stack[1] == tag::STOCK => {
                        let id = attr_value(e, tag::INTERNAL_ID)?.unwrap_or_default();
                        if id.trim().is_empty() {
                            return Err(invalid(vehicle_index, "missing InternalId"));
                        }
                        vehicle = Some(VehicleCheck::default());
                    }
                    4 if name == tag::GPS => {
                        if let Some(v) = vehicle.as_mut() {
                            v.gps = Some((attr_value(e, tag::LAT)?, attr_value(e, tag::LON)?));
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }

            match event {
                Event::Text(t) => {
                    if let (Some(v), 5) = (vehicle.as_mut(), stack.len()) {
                        let text = t
                            .unescape()
                            .map_err(|e| SchemaValidationError::Malformed(e.to_string()))?;
                        v.leaves
                            .entry((stack[3].clone(), stack[4].clone()))
                            .or_default()
                            .push_str(&text);
                    }
                }
                Event::End(_) => {
                    close(&mut stack, &mut vehicle, &mut vehicle_index)?;
                }
                Event::Eof => break,
                _ => {}
            }
            if empty {
                close(&mut stack, &mut vehicle, &mut vehicle_index)?;
            }
        }

        if !stack.is_empty() {
            return Err(SchemaValidationError::Malformed(
                "unexpected end of document".to_string(),
            ));
        }
        if !saw_provenance {
            return Err(SchemaValidationError::MissingElement(
                tag::PROVENANCE.to_string(),
            ));
        }
        if !saw_stock {
            return Err(SchemaValidationError::MissingElement(tag::STOCK.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct VehicleCheck {
    leaves: HashMap<(String, String), String>,
    seen: Vec<(String, String)>,
    gps: Option<(Option<String>, Option<String>)>,
}

fn close(
    stack: &mut Vec<String>,
    vehicle: &mut Option<VehicleCheck>,
    vehicle_index: &mut usize,
) -> Result<(), SchemaValidationError> {
    if stack.len() == 5 {
        if let Some(v) = vehicle.as_mut() {
            v.seen.push((stack[3].clone(), stack[4].clone()));
        }
    }
    if stack.len() == 3 {
        if let Some(v) = vehicle.take() {
            check_vehicle(&v, *vehicle_index)?;
            *vehicle_index += 1;
        }
    }
    stack.pop();
    Ok(())
}

fn check_vehicle(v: &VehicleCheck, index: usize) -> Result<(), SchemaValidationError> {
    for (group, leaf, kind) in VEHICLE_LEAVES {
        let key = (group.to_string(), leaf.to_string());
        if !v.seen.contains(&key) {
            return Err(invalid(index, &format!("missing {}/{}", group, leaf)));
        }
        let text = v.leaves.get(&key).map(|s| s.trim()).unwrap_or("");
        match kind {
            LeafKind::Text => {}
            LeafKind::Integer => {
                if text.parse::<i64>().is_err() {
                    return Err(invalid(index, &format!("{} '{}' is not an integer", leaf, text)));
                }
            }
            LeafKind::PositiveDecimal => match text.parse::<f64>() {
                Ok(n) if n > 0.0 && n.is_finite() => {}
                _ => {
                    return Err(invalid(
                        index,
                        &format!("{} '{}' is not a positive decimal", leaf, text),
                    ))
                }
            },
        }
    }

    match &v.gps {
        Some((Some(lat), Some(lon)))
            if lat.parse::<f64>().is_ok() && lon.parse::<f64>().is_ok() => {}
        _ => return Err(invalid(index, "missing or invalid Gps coordinates")),
    }
    Ok(())
}

fn check_root(name: &str, e: &BytesStart<'_>) -> Result<(), SchemaValidationError> {
    if name != tag::ROOT {
        return Err(SchemaValidationError::UnexpectedRoot(name.to_string()));
    }
    let generated_on = require_attr(e, tag::ROOT, tag::GENERATED_ON)?;
    if NaiveDate::parse_from_str(&generated_on, "%Y-%m-%d").is_err() {
        return Err(SchemaValidationError::Malformed(format!(
            "{} '{}' is not an ISO date",
            tag::GENERATED_ON,
            generated_on
        )));
    }
    require_attr(e, tag::ROOT, tag::SCHEMA_VERSION)?;
    Ok(())
}

fn element_name(e: &BytesStart<'_>) -> Result<String, SchemaValidationError> {
    std::str::from_utf8(e.name().as_ref())
        .map(|s| s.to_string())
        .map_err(|e| SchemaValidationError::Malformed(e.to_string()))
}

fn attr_value(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, SchemaValidationError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SchemaValidationError::Malformed(e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| SchemaValidationError::Malformed(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(
    e: &BytesStart<'_>,
    element: &str,
    key: &str,
) -> Result<String, SchemaValidationError> {
    match attr_value(e, key)? {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SchemaValidationError::MissingAttribute {
            element: element.to_string(),
            attribute: key.to_string(),
        }),
    }
}

fn invalid(index: usize, message: &str) -> SchemaValidationError {
    SchemaValidationError::InvalidVehicle {
        index,
        message: message.to_string(),
    }
}
