//! Bundle minification.
//!
//! Uses oxc for JavaScript and lightningcss for CSS. A parse error fails the
//! whole emission: a broken bundle is never written.

use anyhow::{Result, anyhow};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::core::MediaType;

/// Minify JavaScript source code.
///
/// Parsed as a classic script: the bundle is loaded with a plain `<script>`
/// tag, so top-level names are globals the page may call. They are neither
/// dropped nor renamed.
pub fn minify_js(source: &str) -> Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::script()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(anyhow!("javascript parse error: {}", error));
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions {
            top_level: Some(false),
            ..MangleOptions::default()
        }),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Ok(code)
}

/// Minify CSS source code.
pub fn minify_css(source: &str) -> Result<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| anyhow!("css parse error: {}", e))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("css print error: {}", e))?;
    Ok(result.code)
}

pub fn minify(media: MediaType, source: &str) -> Result<String> {
    match media {
        MediaType::Css => minify_css(source),
        MediaType::Js => minify_js(source),
    }
}
