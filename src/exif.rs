// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Minimal EXIF reader for the image properties exposed by
//! [`ImageSource::property`](crate::ImageSource::property).
//!
//! Only the APP1 segment of a JPEG stream is examined. The TIFF structure
//! inside it is walked for IFD0, the Exif sub-IFD and the GPS sub-IFD; all
//! other tags are ignored. Malformed EXIF is treated as absent metadata
//! rather than a decode failure.

use crate::error::{Error, Result};
use core::fmt;
use std::{collections::HashMap, str::FromStr};
use tracing::debug;

/// Property keys understood by the image source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    BitsPerSample,
    Orientation,
    ImageLength,
    ImageWidth,
    GpsLatitude,
    GpsLongitude,
    GpsLatitudeRef,
    GpsLongitudeRef,
    DateTimeOriginal,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 9] = [
        PropertyKey::BitsPerSample,
        PropertyKey::Orientation,
        PropertyKey::ImageLength,
        PropertyKey::ImageWidth,
        PropertyKey::GpsLatitude,
        PropertyKey::GpsLongitude,
        PropertyKey::GpsLatitudeRef,
        PropertyKey::GpsLongitudeRef,
        PropertyKey::DateTimeOriginal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PropertyKey::BitsPerSample => "BitsPerSample",
            PropertyKey::Orientation => "Orientation",
            PropertyKey::ImageLength => "ImageLength",
            PropertyKey::ImageWidth => "ImageWidth",
            PropertyKey::GpsLatitude => "GPSLatitude",
            PropertyKey::GpsLongitude => "GPSLongitude",
            PropertyKey::GpsLatitudeRef => "GPSLatitudeRef",
            PropertyKey::GpsLongitudeRef => "GPSLongitudeRef",
            PropertyKey::DateTimeOriginal => "DateTimeOriginal",
        }
    }
}

impl FromStr for PropertyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PropertyKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown property key {s:?}")))
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TAG_IMAGE_WIDTH: u16 = 0x0100;
const TAG_IMAGE_LENGTH: u16 = 0x0101;
const TAG_BITS_PER_SAMPLE: u16 = 0x0102;
const TAG_ORIENTATION: u16 = 0x0112;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

/// Properties found in an EXIF block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Exif {
    values: HashMap<PropertyKey, String>,
}

impl Exif {
    pub fn get(&self, key: PropertyKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Reads the EXIF block of a JPEG stream, empty when there is none.
    pub fn from_jpeg(data: &[u8]) -> Self {
        match find_app1(data).map(parse_tiff) {
            Some(Some(exif)) => exif,
            Some(None) => {
                debug!("ignoring malformed EXIF block");
                Exif::default()
            }
            None => Exif::default(),
        }
    }
}

/// Returns the TIFF payload of the first `Exif` APP1 segment.
fn find_app1(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 || data[0] != 0xff || data[1] != 0xd8 {
        return None;
    }

    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xff {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xff {
            i += 1;
            continue;
        }
        // start of scan or end of image, no metadata follows
        if marker == 0xda || marker == 0xd9 {
            return None;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if len < 2 || i + 2 + len > data.len() {
            return None;
        }
        let payload = &data[i + 4..i + 2 + len];
        if marker == 0xe1 && payload.starts_with(b"Exif\0\0") {
            return Some(&payload[6..]);
        }
        i += 2 + len;
    }
    None
}

#[derive(Copy, Clone)]
enum ByteOrder {
    Little,
    Big,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

struct Entry {
    tag: u16,
    kind: u16,
    count: usize,
    /// Offset of the value bytes within the TIFF data.
    offset: usize,
}

impl Tiff<'_> {
    fn u16_at(&self, at: usize) -> Option<u16> {
        let b = self.data.get(at..at + 2)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32_at(&self, at: usize) -> Option<u32> {
        let b = self.data.get(at..at + 4)?;
        let b = [b[0], b[1], b[2], b[3]];
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        })
    }

    fn entries(&self, ifd: usize) -> Option<Vec<Entry>> {
        let count = self.u16_at(ifd)? as usize;
        let mut entries = Vec::with_capacity(count);
        for n in 0..count {
            let at = ifd + 2 + n * 12;
            let kind = self.u16_at(at + 2)?;
            let count = self.u32_at(at + 4)? as usize;
            let unit = match kind {
                TYPE_BYTE | TYPE_ASCII | 7 => 1,
                TYPE_SHORT => 2,
                TYPE_LONG | 9 => 4,
                TYPE_RATIONAL | 10 => 8,
                _ => continue,
            };
            let offset = if unit * count <= 4 {
                at + 8
            } else {
                self.u32_at(at + 8)? as usize
            };
            if offset.checked_add(unit * count)? > self.data.len() {
                return None;
            }
            entries.push(Entry {
                tag: self.u16_at(at)?,
                kind,
                count,
                offset,
            });
        }
        Some(entries)
    }

    fn unsigned(&self, entry: &Entry, index: usize) -> Option<u32> {
        match entry.kind {
            TYPE_BYTE => self.data.get(entry.offset + index).map(|b| *b as u32),
            TYPE_SHORT => self.u16_at(entry.offset + index * 2).map(u32::from),
            TYPE_LONG => self.u32_at(entry.offset + index * 4),
            _ => None,
        }
    }

    fn numbers(&self, entry: &Entry) -> Option<String> {
        let values = (0..entry.count)
            .map(|i| self.unsigned(entry, i).map(|v| v.to_string()))
            .collect::<Option<Vec<_>>>()?;
        Some(values.join(", "))
    }

    fn ascii(&self, entry: &Entry) -> Option<String> {
        if entry.kind != TYPE_ASCII {
            return None;
        }
        let bytes = self.data.get(entry.offset..entry.offset + entry.count)?;
        let text = bytes.split(|b| *b == 0).next().unwrap_or_default();
        Some(String::from_utf8_lossy(text).trim().to_string())
    }

    fn rationals(&self, entry: &Entry) -> Option<String> {
        if entry.kind != TYPE_RATIONAL {
            return None;
        }
        let values = (0..entry.count)
            .map(|i| {
                let num = self.u32_at(entry.offset + i * 8)?;
                let den = self.u32_at(entry.offset + i * 8 + 4)?;
                Some(format_rational(num, den))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(values.join(", "))
    }
}

fn format_rational(num: u32, den: u32) -> String {
    if den == 0 {
        return "0".to_string();
    }
    if num % den == 0 {
        return (num / den).to_string();
    }
    format!("{:.2}", num as f64 / den as f64)
}

fn orientation_name(value: u32) -> Option<&'static str> {
    Some(match value {
        1 => "Top-left",
        2 => "Top-right",
        3 => "Bottom-right",
        4 => "Bottom-left",
        5 => "Left-top",
        6 => "Right-top",
        7 => "Right-bottom",
        8 => "Left-bottom",
        _ => return None,
    })
}

fn parse_tiff(data: &[u8]) -> Option<Exif> {
    let order = match data.get(0..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    let tiff = Tiff { data, order };
    if tiff.u16_at(2)? != 42 {
        return None;
    }

    let mut values = HashMap::new();
    let mut exif_ifd = None;
    let mut gps_ifd = None;
    for entry in tiff.entries(tiff.u32_at(4)? as usize)? {
        match entry.tag {
            TAG_IMAGE_WIDTH => insert(&mut values, PropertyKey::ImageWidth, tiff.numbers(&entry)),
            TAG_IMAGE_LENGTH => {
                insert(&mut values, PropertyKey::ImageLength, tiff.numbers(&entry))
            }
            TAG_BITS_PER_SAMPLE => {
                insert(&mut values, PropertyKey::BitsPerSample, tiff.numbers(&entry))
            }
            TAG_ORIENTATION => insert(
                &mut values,
                PropertyKey::Orientation,
                tiff.unsigned(&entry, 0)
                    .and_then(orientation_name)
                    .map(str::to_string),
            ),
            TAG_EXIF_IFD => exif_ifd = tiff.unsigned(&entry, 0),
            TAG_GPS_IFD => gps_ifd = tiff.unsigned(&entry, 0),
            _ => {}
        }
    }

    if let Some(ifd) = exif_ifd {
        for entry in tiff.entries(ifd as usize)? {
            if entry.tag == TAG_DATE_TIME_ORIGINAL {
                insert(&mut values, PropertyKey::DateTimeOriginal, tiff.ascii(&entry));
            }
        }
    }

    if let Some(ifd) = gps_ifd {
        for entry in tiff.entries(ifd as usize)? {
            let (key, value) = match entry.tag {
                TAG_GPS_LATITUDE_REF => (PropertyKey::GpsLatitudeRef, tiff.ascii(&entry)),
                TAG_GPS_LATITUDE => (PropertyKey::GpsLatitude, tiff.rationals(&entry)),
                TAG_GPS_LONGITUDE_REF => (PropertyKey::GpsLongitudeRef, tiff.ascii(&entry)),
                TAG_GPS_LONGITUDE => (PropertyKey::GpsLongitude, tiff.rationals(&entry)),
                _ => continue,
            };
            insert(&mut values, key, value);
        }
    }

    Some(Exif { values })
}

fn insert(values: &mut HashMap<PropertyKey, String>, key: PropertyKey, value: Option<String>) {
    if let Some(value) = value {
        values.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Big endian TIFF with IFD0 { Orientation = 6, GPS -> { LatRef "N",
    /// Lat 39/1 54/1 712/100 } }.
    fn tiff_block() -> Vec<u8> {
        let mut t = Vec::new();
        t.extend_from_slice(b"MM\0\x2a");
        t.extend_from_slice(&8u32.to_be_bytes());
        // IFD0 at 8: two entries, then next-IFD pointer
        t.extend_from_slice(&2u16.to_be_bytes());
        t.extend_from_slice(&[0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, 6, 0, 0]);
        t.extend_from_slice(&[0x88, 0x25, 0, 4, 0, 0, 0, 1]);
        t.extend_from_slice(&38u32.to_be_bytes());
        t.extend_from_slice(&0u32.to_be_bytes());
        // GPS IFD at 38
        t.extend_from_slice(&2u16.to_be_bytes());
        t.extend_from_slice(&[0, 1, 0, 2, 0, 0, 0, 2, b'N', 0, 0, 0]);
        t.extend_from_slice(&[0, 2, 0, 5, 0, 0, 0, 3]);
        t.extend_from_slice(&68u32.to_be_bytes());
        t.extend_from_slice(&0u32.to_be_bytes());
        // rationals at 68
        for (n, d) in [(39u32, 1u32), (54, 1), (712, 100)] {
            t.extend_from_slice(&n.to_be_bytes());
            t.extend_from_slice(&d.to_be_bytes());
        }
        t
    }

    fn jpeg_with(tiff: &[u8]) -> Vec<u8> {
        let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
        jpeg.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(tiff);
        jpeg.extend_from_slice(&[0xff, 0xd9]);
        jpeg
    }

    #[test]
    fn reads_orientation_and_gps() {
        let exif = Exif::from_jpeg(&jpeg_with(&tiff_block()));
        assert_eq!(exif.get(PropertyKey::Orientation), Some("Right-top"));
        assert_eq!(exif.get(PropertyKey::GpsLatitudeRef), Some("N"));
        assert_eq!(exif.get(PropertyKey::GpsLatitude), Some("39, 54, 7.12"));
        assert_eq!(exif.get(PropertyKey::GpsLongitude), None);
    }

    #[test]
    fn truncated_block_is_ignored() {
        let mut tiff = tiff_block();
        tiff.truncate(40);
        let exif = Exif::from_jpeg(&jpeg_with(&tiff));
        assert_eq!(exif, Exif::default());
    }

    #[test]
    fn keys_parse_from_platform_names() {
        assert_eq!(
            "GPSLatitude".parse::<PropertyKey>().unwrap(),
            PropertyKey::GpsLatitude
        );
        assert!("Latitude".parse::<PropertyKey>().is_err());
    }
}
