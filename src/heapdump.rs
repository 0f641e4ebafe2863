//! On-disk record streams: zstd-compressed protobuf (`.binpb.zst`).

use anyhow::Result;
use prost::Message;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::graph::{ObjectId, RefLabel, RootKind};
use crate::{MalformedReason, MalformedRecordError, ObjectRecord, Record, RecordRef};

#[derive(Clone, PartialEq, Message)]
pub struct RecordStream {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<RecordMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RecordMessage {
    #[prost(enumeration = "RecordType", tag = "1")]
    pub record_type: i32,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(uint64, optional, tag = "3")]
    pub class_id: Option<u64>,
    #[prost(uint64, tag = "4")]
    pub shallow_size: u64,
    #[prost(message, repeated, tag = "5")]
    pub references: Vec<ReferenceMessage>,
    #[prost(string, optional, tag = "6")]
    pub name: Option<String>,
    #[prost(uint32, tag = "7")]
    pub root_kind: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReferenceMessage {
    #[prost(string, optional, tag = "1")]
    pub field: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub index: Option<u32>,
    #[prost(bool, tag = "3")]
    pub is_static: bool,
    /// 0 is a null reference
    #[prost(uint64, tag = "4")]
    pub target: u64,
    /// Set on the referent of a soft, weak, phantom or finalizer reference
    #[prost(bool, tag = "5")]
    pub is_weak: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RecordType {
    Root = 0,
    Class = 1,
    Instance = 2,
    ObjectArray = 3,
    PrimitiveArray = 4,
}

impl RecordStream {
    pub fn from_binpb_zst(p: impl AsRef<Path>) -> Result<RecordStream> {
        let file = File::open(p)?;
        let mut reader = zstd::Decoder::new(file)?;
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(RecordStream::decode(buf.as_slice())?)
    }

    pub fn to_binpb_zst(&self, p: impl AsRef<Path>) -> Result<()> {
        let file = File::create(p)?;
        let mut writer = zstd::Encoder::new(file, 0)?;
        writer.write_all(&self.encode_to_vec())?;
        writer.finish()?;
        Ok(())
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> RecordStream {
        RecordStream {
            records: records.into_iter().map(RecordMessage::from).collect(),
        }
    }

    /// Validates and converts every message, reporting the first bad one.
    pub fn into_records(self) -> Result<Vec<Record>, MalformedRecordError> {
        self.records
            .into_iter()
            .enumerate()
            .map(|(position, m)| m.into_record(position))
            .collect()
    }
}

impl RecordMessage {
    fn into_record(mut self, position: usize) -> Result<Record, MalformedRecordError> {
        let id = ObjectId(self.id);
        let malformed = |reason| MalformedRecordError {
            position,
            id,
            reason,
        };
        let record_type = RecordType::from_i32(self.record_type)
            .ok_or_else(|| malformed(MalformedReason::UnknownRecordType(self.record_type)))?;
        Ok(match record_type {
            RecordType::Root => {
                let kind = RootKind::from_code(self.root_kind)
                    .ok_or_else(|| malformed(MalformedReason::UnknownRootKind(self.root_kind)))?;
                Record::Root { id, kind }
            }
            RecordType::Class => {
                let name = self
                    .name
                    .take()
                    .ok_or_else(|| malformed(MalformedReason::MissingClassName))?;
                Record::Class {
                    name,
                    object: self.into_object().map_err(malformed)?,
                }
            }
            RecordType::Instance => Record::Instance(self.into_object().map_err(malformed)?),
            RecordType::ObjectArray => Record::ObjectArray(self.into_object().map_err(malformed)?),
            RecordType::PrimitiveArray => {
                Record::PrimitiveArray(self.into_object().map_err(malformed)?)
            }
        })
    }

    fn into_object(self) -> Result<ObjectRecord, MalformedReason> {
        Ok(ObjectRecord {
            id: ObjectId(self.id),
            class_id: self.class_id.map(ObjectId),
            shallow_size: self.shallow_size,
            references: self
                .references
                .into_iter()
                .map(ReferenceMessage::into_record_ref)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl ReferenceMessage {
    fn into_record_ref(self) -> Result<RecordRef, MalformedReason> {
        let label = match (self.field, self.index) {
            (Some(name), None) if self.is_static => RefLabel::Static(name),
            (Some(name), None) => RefLabel::Field(name),
            (None, Some(i)) => RefLabel::Index(i),
            (None, None) => return Err(MalformedReason::UnlabelledReference),
            (Some(_), Some(_)) => return Err(MalformedReason::AmbiguousReference),
        };
        let target = if self.target == 0 {
            None
        } else {
            Some(ObjectId(self.target))
        };
        Ok(RecordRef {
            label,
            target,
            strong: !self.is_weak,
        })
    }
}

impl From<&Record> for RecordMessage {
    fn from(record: &Record) -> Self {
        let (record_type, object, name) = match record {
            Record::Root { id, kind } => {
                return RecordMessage {
                    record_type: RecordType::Root as i32,
                    id: id.0,
                    root_kind: kind.code(),
                    ..Default::default()
                }
            }
            Record::Class { name, object } => (RecordType::Class, object, Some(name.clone())),
            Record::Instance(object) => (RecordType::Instance, object, None),
            Record::ObjectArray(object) => (RecordType::ObjectArray, object, None),
            Record::PrimitiveArray(object) => (RecordType::PrimitiveArray, object, None),
        };
        RecordMessage {
            record_type: record_type as i32,
            id: object.id.0,
            class_id: object.class_id.map(|c| c.0),
            shallow_size: object.shallow_size,
            references: object.references.iter().map(ReferenceMessage::from).collect(),
            name,
            root_kind: 0,
        }
    }
}

impl From<&RecordRef> for ReferenceMessage {
    fn from(r: &RecordRef) -> Self {
        let (field, index, is_static) = match &r.label {
            RefLabel::Field(name) => (Some(name.clone()), None, false),
            RefLabel::Static(name) => (Some(name.clone()), None, true),
            RefLabel::Index(i) => (None, Some(*i), false),
        };
        ReferenceMessage {
            field,
            index,
            is_static,
            target: r.target.map_or(0, |t| t.0),
            is_weak: !r.strong,
        }
    }
}
