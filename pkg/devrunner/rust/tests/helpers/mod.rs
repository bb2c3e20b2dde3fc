// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use devrunner::Supervisor;
use devrunner::manifest::CLASSPATH_FILE;
use devrunner::testing::ClassFileBuilder;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub const SERVLET_CLASS: &str = "com.example.HelloServlet";

/// A fake build output tree: content root, class root, resources and a
/// work directory holding the classpath manifest.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("webapp/WEB-INF")).unwrap();
        std::fs::write(root.join("webapp/index.html"), "<h1>hello dev server</h1>").unwrap();
        std::fs::write(root.join("webapp/WEB-INF/secret.txt"), "hidden").unwrap();

        std::fs::create_dir_all(root.join("classes")).unwrap();
        ClassFileBuilder::new("com/example/HelloServlet")
            .super_class("javax/servlet/http/HttpServlet")
            .annotation_with_strings("Ljavax/servlet/annotation/WebServlet;", "value", &["/hello"])
            .write_to(&root.join("classes"));
        std::fs::create_dir_all(root.join("resources/META-INF/resources")).unwrap();
        std::fs::write(root.join("resources/META-INF/resources/app.js"), "console.log(1)").unwrap();

        std::fs::create_dir_all(root.join("work")).unwrap();
        std::fs::write(root.join("work").join(CLASSPATH_FILE), "").unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    /// Runner command line for `backend` on `port`.
    pub fn command(&self, backend: &str, port: u16) -> Command {
        let root = self.path();
        let mut command = Command::new(env!("CARGO_BIN_EXE_devrunner"));
        command
            .env_remove("DEVRUN_BACKEND")
            .env_remove("DEVRUN_CONFIG")
            .env_remove("DEVRUN_LOG_FILE")
            .arg("--backend")
            .arg(backend)
            .arg(port.to_string())
            .arg(root.join("webapp"))
            .arg(root.join("classes"))
            .arg(root.join("resources"))
            .arg("INFO")
            .arg("demo")
            .arg(root.join("work"));
        command
    }

    pub fn start(&self, backend: &str, port: u16) -> Supervisor {
        Supervisor::spawn(self.command(backend, port)).expect("failed to start devrunner")
    }
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Plain HTTP/1.1 GET; returns the raw response.
pub fn http_get(port: u16, path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(DEFAULT_TIMEOUT)).unwrap();
    write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

pub fn dump(runner: &Supervisor) -> String {
    runner.lines().join("\n")
}
