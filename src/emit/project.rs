//! Configuration header, entry file and build script.

use std::{fmt::Write, path::Path};

use crate::{
    config::CompilerConfig,
    emit::header_path,
    ir::names::qualified_name,
    Result,
};

/// File name of the configuration header.
pub const CONFIG_HEADER: &str = "Config.h";
/// File name of the program entry point.
pub const ENTRY_FILE: &str = "main.cpp";
/// File name of the build script.
pub const BUILD_SCRIPT: &str = "CMakeLists.txt";

fn define(out: &mut String, name: &str, value: &str) -> Result<()> {
    writeln!(out, "#ifndef {name}")?;
    writeln!(out, "#define {name} {value}")?;
    writeln!(out, "#endif")?;
    writeln!(out)?;
    Ok(())
}

/// Renders `Config.h`.
///
/// Every switch is wrapped in `#ifndef` so a build can override it from the command line.
/// A user definition is `NAME` or `NAME VALUE`.
///
/// # Errors
///
/// Returns [`crate::Error::Format`] if rendering fails.
pub fn config_header(config: &CompilerConfig) -> Result<String> {
    let mut out = String::from("#pragma once\n\n");
    let switches = [
        ("USE_STACK_TRACES", config.use_stack_traces),
        ("USE_LINE_NUMBERS", config.use_stack_traces && config.use_line_numbers),
        ("USE_STACK_COOKIES", config.use_stack_traces && config.use_stack_cookies),
        ("USE_VALUE_CHECKS", config.use_value_checks),
        ("USE_LEAK_CHECK", config.use_leak_check),
        ("USE_PLATFORM_OVERRIDE", config.platform_override),
    ];
    for (name, enabled) in switches {
        define(&mut out, name, if enabled { "true" } else { "false" })?;
    }

    for definition in &config.definitions {
        let definition = definition.trim();
        let (name, value) = definition
            .split_once(char::is_whitespace)
            .map_or((definition, "1"), |(name, value)| (name, value.trim()));
        if name.is_empty() {
            continue;
        }
        define(&mut out, name, value)?;
    }
    Ok(out)
}

/// Renders `main.cpp` for the given main class.
///
/// # Errors
///
/// Returns [`crate::Error::Format`] if rendering fails.
pub fn entry_file(main_class: &str) -> Result<String> {
    let name = main_class.replace('.', "/");
    let mut out = String::new();
    writeln!(out, "#include \"{}\"", header_path(&name))?;
    writeln!(out, "#include \"Clearwing.h\"")?;
    writeln!(out)?;
    writeln!(out, "int main() {{")?;
    writeln!(
        out,
        "    runVM(SM_{}_main_Array1_java_lang_String);",
        qualified_name(&name)
    )?;
    writeln!(out, "}}")?;
    Ok(out)
}

/// Renders a minimal `CMakeLists.txt` building the generated sources against the runtime.
///
/// # Errors
///
/// Returns [`crate::Error::Format`] if rendering fails.
pub fn build_script(sources: &[&Path]) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "cmake_minimum_required(VERSION 3.16)")?;
    writeln!(out, "project(Generated CXX)")?;
    writeln!(out)?;
    writeln!(out, "set(CMAKE_CXX_STANDARD 20)")?;
    writeln!(out, "set(CMAKE_CXX_STANDARD_REQUIRED ON)")?;
    writeln!(out)?;
    writeln!(out, "file(GLOB_RECURSE RUNTIME_SOURCES clearwing/*.cpp)")?;
    writeln!(out, "add_executable(app")?;
    writeln!(out, "    ${{RUNTIME_SOURCES}}")?;
    for source in sources {
        writeln!(out, "    {}", source.display())?;
    }
    writeln!(out, ")")?;
    writeln!(out, "target_include_directories(app PRIVATE . clearwing)")?;
    Ok(out)
}
