// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Minimal JVM class-file reader: enough to learn a class's name, its
//! supertypes and its runtime-visible annotations.

use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::number::complete::{be_f32, be_f64, be_i32, be_i64, be_u8, be_u16, be_u32};
use nom::{IResult, Parser};
use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;
const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const MAX_ANNOTATION_DEPTH: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("not a class file")]
    BadMagic,
    #[error("truncated class file")]
    Truncated,
    #[error("malformed class file: {0:?}")]
    Malformed(ErrorKind),
    #[error("invalid constant pool reference #{0}")]
    BadConstant(u16),
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for ClassFileError {
    fn from(e: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match e {
            nom::Err::Incomplete(_) => ClassFileError::Truncated,
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                ErrorKind::Eof => ClassFileError::Truncated,
                code => ClassFileError::Malformed(code),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_name: String,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(String),
    Enum { type_name: String, constant: String },
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    /// Constant strings held by this value, flattening arrays.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            ElementValue::Const(s) => vec![s.as_str()],
            ElementValue::Array(values) => values.iter().flat_map(ElementValue::strings).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Other,
    // Second slot of a Long/Double, and slot 0.
    Unusable,
}

struct ConstantPool(Vec<Constant>);

impl ConstantPool {
    fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        self.0
            .get(usize::from(index))
            .ok_or(ClassFileError::BadConstant(index))
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFileError::BadConstant(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassFileError> {
        match self.get(index)? {
            Constant::Class(name_index) => Ok(self.utf8(*name_index)?.replace('/', ".")),
            _ => Err(ClassFileError::BadConstant(index)),
        }
    }

    fn render(&self, tag: u8, index: u16) -> Result<String, ClassFileError> {
        let rendered = match (tag, self.get(index)?) {
            (b'Z', Constant::Integer(v)) => (*v != 0).to_string(),
            (b'C', Constant::Integer(v)) => u32::try_from(*v)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .ok_or(ClassFileError::BadConstant(index))?,
            (_, Constant::Integer(v)) => v.to_string(),
            (_, Constant::Long(v)) => v.to_string(),
            (_, Constant::Float(v)) => v.to_string(),
            (_, Constant::Double(v)) => v.to_string(),
            (_, Constant::Utf8(s)) => s.clone(),
            _ => return Err(ClassFileError::BadConstant(index)),
        };
        Ok(rendered)
    }
}

/// `Lcom/example/Foo;` -> `com.example.Foo`. Other descriptors are returned
/// unchanged.
pub fn descriptor_to_class_name(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .map_or_else(|| descriptor.to_string(), |d| d.replace('/', "."))
}

// -- raw structures, indices not yet resolved --

struct RawClass<'a> {
    pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    attributes: Vec<(u16, &'a [u8])>,
}

struct RawAnnotation {
    type_index: u16,
    elements: Vec<(u16, RawElement)>,
}

enum RawElement {
    Const(u8, u16),
    Enum(u16, u16),
    Class(u16),
    Annotation(RawAnnotation),
    Array(Vec<RawElement>),
}

fn fail<T>(input: &[u8], kind: ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

fn constant(input: &[u8]) -> IResult<&[u8], (Constant, bool)> {
    let (input, tag) = be_u8(input)?;
    match tag {
        1 => {
            let (input, len) = be_u16(input)?;
            let (input, bytes) = take(len).parse(input)?;
            let text = String::from_utf8_lossy(bytes).into_owned();
            Ok((input, (Constant::Utf8(text), false)))
        }
        3 => be_i32(input).map(|(i, v)| (i, (Constant::Integer(v), false))),
        4 => be_f32(input).map(|(i, v)| (i, (Constant::Float(v), false))),
        5 => be_i64(input).map(|(i, v)| (i, (Constant::Long(v), true))),
        6 => be_f64(input).map(|(i, v)| (i, (Constant::Double(v), true))),
        7 => be_u16(input).map(|(i, v)| (i, (Constant::Class(v), false))),
        // String, MethodType, Module, Package
        8 | 16 | 19 | 20 => take(2u8).parse(input).map(|(i, _)| (i, (Constant::Other, false))),
        // MethodHandle
        15 => take(3u8).parse(input).map(|(i, _)| (i, (Constant::Other, false))),
        // Field/Method/InterfaceMethod refs, NameAndType, Dynamic, InvokeDynamic
        9 | 10 | 11 | 12 | 17 | 18 => {
            take(4u8).parse(input).map(|(i, _)| (i, (Constant::Other, false)))
        }
        _ => fail(input, ErrorKind::Tag),
    }
}

fn constant_pool(input: &[u8]) -> IResult<&[u8], ConstantPool> {
    let (mut input, count) = be_u16(input)?;
    let mut pool = Vec::with_capacity(usize::from(count));
    pool.push(Constant::Unusable);
    while pool.len() < usize::from(count) {
        let (rest, (c, wide)) = constant(input)?;
        input = rest;
        pool.push(c);
        if wide {
            pool.push(Constant::Unusable);
        }
    }
    Ok((input, ConstantPool(pool)))
}

fn attribute(input: &[u8]) -> IResult<&[u8], (u16, &[u8])> {
    let (input, name_index) = be_u16(input)?;
    let (input, len) = be_u32(input)?;
    let (input, info) = take(len).parse(input)?;
    Ok((input, (name_index, info)))
}

fn attributes(input: &[u8]) -> IResult<&[u8], Vec<(u16, &[u8])>> {
    let (mut input, count) = be_u16(input)?;
    let mut attrs = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let (rest, attr) = attribute(input)?;
        input = rest;
        attrs.push(attr);
    }
    Ok((input, attrs))
}

/// Fields and methods share a layout; only their attributes need skipping.
fn skip_members(input: &[u8]) -> IResult<&[u8], ()> {
    let (mut input, count) = be_u16(input)?;
    for _ in 0..count {
        // access_flags, name_index, descriptor_index
        let (rest, _) = take(6u8).parse(input)?;
        let (rest, _) = attributes(rest)?;
        input = rest;
    }
    Ok((input, ()))
}

fn class_file(input: &[u8]) -> IResult<&[u8], RawClass<'_>> {
    let (input, magic) = be_u32(input)?;
    if magic != MAGIC {
        return fail(input, ErrorKind::Tag);
    }
    // minor_version, major_version
    let (input, _) = take(4u8).parse(input)?;
    let (input, pool) = constant_pool(input)?;
    let (input, _access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (mut input, interface_count) = be_u16(input)?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));
    for _ in 0..interface_count {
        let (rest, index) = be_u16(input)?;
        input = rest;
        interfaces.push(index);
    }
    let (input, _) = skip_members(input)?; // fields
    let (input, _) = skip_members(input)?; // methods
    let (input, attributes) = attributes(input)?;
    Ok((
        input,
        RawClass {
            pool,
            this_class,
            super_class,
            interfaces,
            attributes,
        },
    ))
}

fn element_value(input: &[u8], depth: usize) -> IResult<&[u8], RawElement> {
    if depth > MAX_ANNOTATION_DEPTH {
        return fail(input, ErrorKind::TooLarge);
    }
    let (input, tag) = be_u8(input)?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            be_u16(input).map(|(i, index)| (i, RawElement::Const(tag, index)))
        }
        b'e' => {
            let (input, type_index) = be_u16(input)?;
            let (input, const_index) = be_u16(input)?;
            Ok((input, RawElement::Enum(type_index, const_index)))
        }
        b'c' => be_u16(input).map(|(i, index)| (i, RawElement::Class(index))),
        b'@' => annotation(input, depth + 1).map(|(i, a)| (i, RawElement::Annotation(a))),
        b'[' => {
            let (mut input, count) = be_u16(input)?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                let (rest, value) = element_value(input, depth + 1)?;
                input = rest;
                values.push(value);
            }
            Ok((input, RawElement::Array(values)))
        }
        _ => fail(input, ErrorKind::Tag),
    }
}

fn annotation(input: &[u8], depth: usize) -> IResult<&[u8], RawAnnotation> {
    let (input, type_index) = be_u16(input)?;
    let (mut input, pair_count) = be_u16(input)?;
    let mut elements = Vec::with_capacity(usize::from(pair_count));
    for _ in 0..pair_count {
        let (rest, name_index) = be_u16(input)?;
        let (rest, value) = element_value(rest, depth)?;
        input = rest;
        elements.push((name_index, value));
    }
    Ok((
        input,
        RawAnnotation {
            type_index,
            elements,
        },
    ))
}

fn annotations(input: &[u8]) -> IResult<&[u8], Vec<RawAnnotation>> {
    let (mut input, count) = be_u16(input)?;
    let mut list = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let (rest, a) = annotation(input, 0)?;
        input = rest;
        list.push(a);
    }
    Ok((input, list))
}

fn resolve_annotation(pool: &ConstantPool, raw: RawAnnotation) -> Result<Annotation, ClassFileError> {
    let type_name = descriptor_to_class_name(pool.utf8(raw.type_index)?);
    let elements = raw
        .elements
        .into_iter()
        .map(|(name_index, value)| Ok((pool.utf8(name_index)?.to_string(), resolve_element(pool, value)?)))
        .collect::<Result<_, ClassFileError>>()?;
    Ok(Annotation {
        type_name,
        elements,
    })
}

fn resolve_element(pool: &ConstantPool, raw: RawElement) -> Result<ElementValue, ClassFileError> {
    Ok(match raw {
        RawElement::Const(tag, index) => ElementValue::Const(pool.render(tag, index)?),
        RawElement::Enum(type_index, const_index) => ElementValue::Enum {
            type_name: descriptor_to_class_name(pool.utf8(type_index)?),
            constant: pool.utf8(const_index)?.to_string(),
        },
        RawElement::Class(index) => ElementValue::Class(descriptor_to_class_name(pool.utf8(index)?)),
        RawElement::Annotation(a) => ElementValue::Annotation(resolve_annotation(pool, a)?),
        RawElement::Array(values) => ElementValue::Array(
            values
                .into_iter()
                .map(|v| resolve_element(pool, v))
                .collect::<Result<_, _>>()?,
        ),
    })
}

pub fn parse_class(bytes: &[u8]) -> Result<ClassInfo, ClassFileError> {
    if bytes.len() >= 4 && !bytes.starts_with(&MAGIC.to_be_bytes()) {
        return Err(ClassFileError::BadMagic);
    }
    let (_, raw) = class_file(bytes)?;
    let pool = &raw.pool;

    let name = pool.class_name(raw.this_class)?;
    // Only java.lang.Object has no super class.
    let super_class = match raw.super_class {
        0 => None,
        index => Some(pool.class_name(index)?),
    };
    let interfaces = raw
        .interfaces
        .iter()
        .map(|&index| pool.class_name(index))
        .collect::<Result<_, _>>()?;

    let mut found = Vec::new();
    for (name_index, info) in raw.attributes {
        if pool.utf8(name_index)? != RUNTIME_VISIBLE_ANNOTATIONS {
            continue;
        }
        let (_, list) = annotations(info)?;
        for a in list {
            found.push(resolve_annotation(pool, a)?);
        }
    }

    Ok(ClassInfo {
        name,
        super_class,
        interfaces,
        annotations: found,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::testing::ClassFileBuilder;

    #[test]
    fn test_parse_plain_class() {
        let bytes = ClassFileBuilder::new("com/example/Plain").build();
        let info = parse_class(&bytes).unwrap();
        assert_eq!(info.name, "com.example.Plain");
        assert_eq!(info.super_class.as_deref(), Some("java.lang.Object"));
        assert!(info.interfaces.is_empty());
        assert!(info.annotations.is_empty());
    }

    #[test]
    fn test_parse_supertypes() {
        let bytes = ClassFileBuilder::new("com/example/Init")
            .super_class("com/example/Base")
            .interface("jakarta/servlet/ServletContainerInitializer")
            .interface("java/io/Serializable")
            .build();
        let info = parse_class(&bytes).unwrap();
        assert_eq!(info.super_class.as_deref(), Some("com.example.Base"));
        assert_eq!(
            info.interfaces,
            vec!["jakarta.servlet.ServletContainerInitializer", "java.io.Serializable"]
        );
    }

    #[test]
    fn test_parse_annotation_with_string_array() {
        let bytes = ClassFileBuilder::new("com/example/HelloServlet")
            .annotation_with_strings(
                "Ljakarta/servlet/annotation/WebServlet;",
                "urlPatterns",
                &["/hello", "/hi/*"],
            )
            .annotation("Lcom/example/Marker;")
            .build();
        let info = parse_class(&bytes).unwrap();
        assert_eq!(info.annotations.len(), 2);

        let servlet = &info.annotations[0];
        assert_eq!(servlet.type_name, "jakarta.servlet.annotation.WebServlet");
        assert_eq!(
            servlet.element("urlPatterns").unwrap().strings(),
            vec!["/hello", "/hi/*"]
        );
        assert_eq!(info.annotations[1].type_name, "com.example.Marker");
        assert!(info.annotations[1].elements.is_empty());
    }

    #[test]
    fn test_parse_with_wide_constants() {
        let bytes = ClassFileBuilder::new("com/example/Wide")
            .long_constant(42)
            .annotation("Lcom/example/Marker;")
            .build();
        let info = parse_class(&bytes).unwrap();
        assert_eq!(info.name, "com.example.Wide");
        assert_eq!(info.annotations[0].type_name, "com.example.Marker");
    }

    #[test]
    fn test_bad_magic() {
        assert_eq!(parse_class(b"PK\x03\x04rest"), Err(ClassFileError::BadMagic));
    }

    #[test]
    fn test_truncated() {
        let bytes = ClassFileBuilder::new("com/example/Cut").build();
        let cut = &bytes[..bytes.len() / 2];
        assert_eq!(parse_class(cut), Err(ClassFileError::Truncated));
        assert_eq!(parse_class(&[]), Err(ClassFileError::Truncated));
    }

    #[test]
    fn test_descriptor_to_class_name() {
        assert_eq!(descriptor_to_class_name("Ljava/lang/String;"), "java.lang.String");
        assert_eq!(descriptor_to_class_name("I"), "I");
        assert_eq!(descriptor_to_class_name("[Ljava/lang/String;"), "[Ljava/lang/String;");
    }

    #[test]
    fn test_element_value_strings() {
        let value = ElementValue::Array(vec![
            ElementValue::Const("/a".into()),
            ElementValue::Class("com.example.X".into()),
            ElementValue::Array(vec![ElementValue::Const("/b".into())]),
        ]);
        assert_eq!(value.strings(), vec!["/a", "/b"]);
    }
}
