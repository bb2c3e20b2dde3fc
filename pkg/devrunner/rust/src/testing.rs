// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Fixture builders for tests: minimal class files and jar archives.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

struct Pool {
    bytes: Vec<u8>,
    slots: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            slots: 0,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    fn next(&mut self, width: u16) -> u16 {
        let index = self.slots + 1;
        self.slots += width;
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(&index) = self.utf8.get(s) {
            return index;
        }
        let index = self.next(1);
        self.bytes.push(1);
        let len = u16::try_from(s.len()).expect("constant too long");
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        if let Some(&index) = self.classes.get(internal_name) {
            return index;
        }
        let name = self.utf8(internal_name);
        let index = self.next(1);
        self.bytes.push(7);
        self.bytes.extend_from_slice(&name.to_be_bytes());
        self.classes.insert(internal_name.to_string(), index);
        index
    }

    fn long(&mut self, value: i64) {
        self.next(2);
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }
}

struct AnnotationSpec {
    descriptor: String,
    strings: Option<(String, Vec<String>)>,
}

/// Builds a valid class file with an empty body and optional
/// `RuntimeVisibleAnnotations`. Names use the internal `a/b/C` form.
pub struct ClassFileBuilder {
    name: String,
    super_class: String,
    interfaces: Vec<String>,
    annotations: Vec<AnnotationSpec>,
    longs: Vec<i64>,
}

impl ClassFileBuilder {
    pub fn new(internal_name: &str) -> Self {
        Self {
            name: internal_name.to_string(),
            super_class: "java/lang/Object".to_string(),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            longs: Vec::new(),
        }
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_class = internal_name.to_string();
        self
    }

    pub fn interface(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    /// Marker annotation, `descriptor` like `Lcom/example/Marker;`.
    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(AnnotationSpec {
            descriptor: descriptor.to_string(),
            strings: None,
        });
        self
    }

    /// Annotation with one string-array element.
    pub fn annotation_with_strings(mut self, descriptor: &str, element: &str, values: &[&str]) -> Self {
        self.annotations.push(AnnotationSpec {
            descriptor: descriptor.to_string(),
            strings: Some((
                element.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )),
        });
        self
    }

    /// Adds an unused wide constant to the pool.
    pub fn long_constant(mut self, value: i64) -> Self {
        self.longs.push(value);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = Pool::new();
        let this_class = pool.class(&self.name);
        let super_class = pool.class(&self.super_class);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();
        for value in &self.longs {
            pool.long(*value);
        }

        let mut attribute = Vec::new();
        let attribute_name = if self.annotations.is_empty() {
            None
        } else {
            Some(pool.utf8("RuntimeVisibleAnnotations"))
        };
        attribute.extend_from_slice(&u16::try_from(self.annotations.len()).unwrap().to_be_bytes());
        for a in &self.annotations {
            attribute.extend_from_slice(&pool.utf8(&a.descriptor).to_be_bytes());
            match &a.strings {
                None => attribute.extend_from_slice(&0u16.to_be_bytes()),
                Some((element, values)) => {
                    attribute.extend_from_slice(&1u16.to_be_bytes());
                    attribute.extend_from_slice(&pool.utf8(element).to_be_bytes());
                    attribute.push(b'[');
                    attribute.extend_from_slice(&u16::try_from(values.len()).unwrap().to_be_bytes());
                    for v in values {
                        attribute.push(b's');
                        attribute.extend_from_slice(&pool.utf8(v).to_be_bytes());
                    }
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&(pool.slots + 1).to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_class.to_be_bytes());
        out.extend_from_slice(&super_class.to_be_bytes());
        out.extend_from_slice(&u16::try_from(interfaces.len()).unwrap().to_be_bytes());
        for i in interfaces {
            out.extend_from_slice(&i.to_be_bytes());
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&0u16.to_be_bytes()); // methods
        match attribute_name {
            None => out.extend_from_slice(&0u16.to_be_bytes()),
            Some(name) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&u32::try_from(attribute.len()).unwrap().to_be_bytes());
                out.extend_from_slice(&attribute);
            }
        }
        out
    }

    /// Path of this class relative to a class root, e.g. `com/example/Foo.class`.
    pub fn relative_path(&self) -> String {
        format!("{}.class", self.name)
    }

    /// Write the class under `root` at its package path.
    pub fn write_to(self, root: &Path) -> PathBuf {
        let path = root.join(self.relative_path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Write a zip archive at `path` with the given `(name, contents)` entries.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

/// Jar entry for a built class.
pub fn class_entry(builder: ClassFileBuilder) -> (String, Vec<u8>) {
    (builder.relative_path(), builder.build())
}
