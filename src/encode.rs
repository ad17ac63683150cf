//! Document encoder: [`VehicleReport`] → canonical XML text.
//!
//! The output is deterministic: element order, attribute order, indentation
//! and number formatting are fixed, so encoding the same report twice yields
//! byte-identical documents. The nested shape below is built here and only
//! here; records stay flat everywhere else.
//!
//! ```text
//! VehicleReport @GeneratedOn @SchemaVersion
//! ├── Provenance @ValidatedBy @RequestedBy
//! └── Stock
//!     └── Vehicle @InternalId            (one per record, in batch order)
//!         ├── Identification  Designation, Price, Year, Category
//!         ├── Technical       Displacement, EnginePower, FuelType, Transmission
//!         ├── UsageHistory    Odometer
//!         └── Geography       City, Gps @Lat @Lon
//! ```

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::EncodingError;
use crate::models::{VehicleRecord, VehicleReport};

/// Element and attribute names of the document format.
pub mod tag {
    pub const ROOT: &str = "VehicleReport";
    pub const GENERATED_ON: &str = "GeneratedOn";
    pub const SCHEMA_VERSION: &str = "SchemaVersion";
    pub const PROVENANCE: &str = "Provenance";
    pub const VALIDATED_BY: &str = "ValidatedBy";
    pub const REQUESTED_BY: &str = "RequestedBy";
    pub const STOCK: &str = "Stock";
    pub const VEHICLE: &str = "Vehicle";
    pub const INTERNAL_ID: &str = "InternalId";
    pub const IDENTIFICATION: &str = "Identification";
    pub const DESIGNATION: &str = "Designation";
    pub const PRICE: &str = "Price";
    pub const YEAR: &str = "Year";
    pub const CATEGORY: &str = "Category";
    pub const TECHNICAL: &str = "Technical";
    pub const DISPLACEMENT: &str = "Displacement";
    pub const ENGINE_POWER: &str = "EnginePower";
    pub const FUEL_TYPE: &str = "FuelType";
    pub const TRANSMISSION: &str = "Transmission";
    pub const USAGE_HISTORY: &str = "UsageHistory";
    pub const ODOMETER: &str = "Odometer";
    pub const GEOGRAPHY: &str = "Geography";
    pub const CITY: &str = "City";
    pub const GPS: &str = "Gps";
    pub const LAT: &str = "Lat";
    pub const LON: &str = "Lon";
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Encode a report as an XML document (declaration included).
pub fn encode_report(report: &VehicleReport) -> Result<String, EncodingError> {
    let mut w = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut w,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let generated_on = report.generated_on.format("%Y-%m-%d").to_string();
    let root = BytesStart::new(tag::ROOT).with_attributes([
        (tag::GENERATED_ON, generated_on.as_str()),
        (tag::SCHEMA_VERSION, report.schema_version.as_str()),
    ]);
    emit(&mut w, Event::Start(root))?;

    let provenance = BytesStart::new(tag::PROVENANCE).with_attributes([
        (tag::VALIDATED_BY, report.provenance.validated_by.as_str()),
        (tag::REQUESTED_BY, report.provenance.requested_by.as_str()),
    ]);
    emit(&mut w, Event::Empty(provenance))?;

    open(&mut w, tag::STOCK)?;
    for vehicle in &report.vehicles {
        write_vehicle(&mut w, vehicle)?;
    }
    close(&mut w, tag::STOCK)?;
    close(&mut w, tag::ROOT)?;

    Ok(String::from_utf8(w.into_inner().into_inner())?)
}

fn write_vehicle(w: &mut XmlWriter, v: &VehicleRecord) -> Result<(), EncodingError> {
    let start = BytesStart::new(tag::VEHICLE)
        .with_attributes([(tag::INTERNAL_ID, v.identifier.as_str())]);
    emit(w, Event::Start(start))?;

    open(w, tag::IDENTIFICATION)?;
    text_element(w, tag::DESIGNATION, &v.designation)?;
    text_element(w, tag::PRICE, &v.price.to_string())?;
    text_element(w, tag::YEAR, &v.year.to_string())?;
    text_element(w, tag::CATEGORY, &v.category)?;
    close(w, tag::IDENTIFICATION)?;

    open(w, tag::TECHNICAL)?;
    text_element(w, tag::DISPLACEMENT, &v.displacement.to_string())?;
    text_element(w, tag::ENGINE_POWER, &v.engine_power.to_string())?;
    text_element(w, tag::FUEL_TYPE, &v.fuel_type)?;
    text_element(w, tag::TRANSMISSION, &v.transmission)?;
    close(w, tag::TECHNICAL)?;

    open(w, tag::USAGE_HISTORY)?;
    text_element(w, tag::ODOMETER, &v.odometer.to_string())?;
    close(w, tag::USAGE_HISTORY)?;

    open(w, tag::GEOGRAPHY)?;
    text_element(w, tag::CITY, &v.city)?;
    let lat = v.latitude.to_string();
    let lon = v.longitude.to_string();
    let gps = BytesStart::new(tag::GPS)
        .with_attributes([(tag::LAT, lat.as_str()), (tag::LON, lon.as_str())]);
    emit(w, Event::Empty(gps))?;
    close(w, tag::GEOGRAPHY)?;

    close(w, tag::VEHICLE)
}

fn emit(w: &mut XmlWriter, event: Event<'_>) -> Result<(), EncodingError> {
    w.write_event(event)
        .map_err(|e| EncodingError::Writer(e.to_string()))
}

fn open(w: &mut XmlWriter, name: &str) -> Result<(), EncodingError> {
    emit(w, Event::Start(BytesStart::new(name)))
}

fn close(w: &mut XmlWriter, name: &str) -> Result<(), EncodingError> {
    emit(w, Event::End(BytesEnd::new(name)))
}

fn text_element(w: &mut XmlWriter, name: &str, value: &str) -> Result<(), EncodingError> {
    open(w, name)?;
    emit(w, Event::Text(BytesText::new(value)))?;
    close(w, name)
}
