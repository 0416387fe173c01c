//! Transformation functions.
//!
//! Every transformation is a pure `&str -> Cow<str>` function. They are
//! resolved by name once, when rules are compiled, and stored as plain
//! function pointers.

mod decode;
mod encode;
mod normalize;
mod pipeline;

pub use decode::*;
pub use encode::*;
pub use normalize::*;
pub use pipeline::TransformationPipeline;

use std::borrow::Cow;
use std::fmt;

/// Signature shared by all transformations.
pub type TransformFn = for<'a> fn(&'a str) -> Cow<'a, str>;

/// A named transformation function.
#[derive(Clone, Copy)]
pub struct Transformation {
    name: &'static str,
    func: TransformFn,
}

impl Transformation {
    /// Pair a name with a function.
    pub const fn new(name: &'static str, func: TransformFn) -> Self {
        Self { name, func }
    }

    /// Name as used in `t:` actions.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply the transformation.
    #[inline]
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        (self.func)(input)
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{}", self.name)
    }
}

/// `length`: byte length of the input.
pub fn length(input: &str) -> Cow<'_, str> {
    Cow::Owned(input.len().to_string())
}

/// Built-in transformations. `none` is handled by the pipeline builder.
pub static BUILTIN: &[Transformation] = &[
    Transformation::new("lowercase", lowercase),
    Transformation::new("uppercase", uppercase),
    Transformation::new("urlDecode", url_decode),
    Transformation::new("urlDecodeUni", url_decode_uni),
    Transformation::new("htmlEntityDecode", html_entity_decode),
    Transformation::new("jsDecode", js_decode),
    Transformation::new("base64Decode", base64_decode),
    Transformation::new("hexDecode", hex_decode),
    Transformation::new("base64Encode", base64_encode),
    Transformation::new("hexEncode", hex_encode),
    Transformation::new("urlEncode", url_encode),
    Transformation::new("md5", md5),
    Transformation::new("sha1", sha1),
    Transformation::new("length", length),
    Transformation::new("trim", trim),
    Transformation::new("trimLeft", trim_left),
    Transformation::new("trimRight", trim_right),
    Transformation::new("compressWhitespace", compress_whitespace),
    Transformation::new("removeWhitespace", remove_whitespace),
    Transformation::new("removeNulls", remove_nulls),
    Transformation::new("replaceNulls", replace_nulls),
    Transformation::new("normalizePath", normalize_path),
    Transformation::new("normalizePathWin", normalize_path_win),
    Transformation::new("removeComments", remove_comments),
    Transformation::new("cmdLine", cmd_line),
];
