//! Compile-time configuration: optimization level, warning selection,
//! diagnostic color policy, and the error cap.
//!
//! # Example
//!
//! ```rust,ignore
//! use c89c::{CompileOptions, OptLevel};
//!
//! let options = CompileOptions::new()
//!     .with_opt_level(OptLevel::O2)
//!     .with_error_cap(50);
//! ```

use crate::diagnostics::DEFAULT_ERROR_CAP;

/// Optimization level, ordered so `level >= OptLevel::O1` is a valid check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    O0,
    O1,
    O2,
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::O0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorPolicy {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorPolicy {
    /// Resolves `Auto` against whether the output stream is a terminal.
    pub fn resolve(self, stdout_is_tty: bool) -> bool {
        match self {
            ColorPolicy::Always => true,
            ColorPolicy::Never => false,
            ColorPolicy::Auto => stdout_is_tty,
        }
    }
}

/// Which warning categories are enabled. All on by default; `-Wno-<name>`
/// turns individual ones off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningSet {
    pub unused_variable: bool,
    pub narrowing: bool,
    pub shadow: bool,
    pub sign_compare: bool,
}

impl Default for WarningSet {
    fn default() -> Self {
        WarningSet::all()
    }
}

impl WarningSet {
    pub fn all() -> Self {
        WarningSet {
            unused_variable: true,
            narrowing: true,
            shadow: true,
            sign_compare: true,
        }
    }

    pub fn none() -> Self {
        WarningSet {
            unused_variable: false,
            narrowing: false,
            shadow: false,
            sign_compare: false,
        }
    }

    /// Disables one warning category by its `-Wno-<name>` spelling. Returns
    /// `false` if `name` isn't recognized.
    pub fn disable(&mut self, name: &str) -> bool {
        match name {
            "unused-variable" => self.unused_variable = false,
            "narrowing" => self.narrowing = false,
            "shadow" => self.shadow = false,
            "sign-compare" => self.sign_compare = false,
            _ => return false,
        }
        true
    }
}

/// The full set of knobs that vary a single compilation run, threaded
/// through every pipeline stage from the driver.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    pub warnings: WarningSet,
    pub color: ColorPolicy,
    pub error_cap: usize,
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_ir: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            opt_level: OptLevel::default(),
            warnings: WarningSet::default(),
            color: ColorPolicy::default(),
            error_cap: DEFAULT_ERROR_CAP,
            dump_tokens: false,
            dump_ast: false,
            dump_ir: false,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opt_level(mut self, level: OptLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_warnings(mut self, warnings: WarningSet) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_color(mut self, color: ColorPolicy) -> Self {
        self.color = color;
        self
    }

    pub fn with_error_cap(mut self, cap: usize) -> Self {
        self.error_cap = cap;
        self
    }

    pub fn with_dump_tokens(mut self, enabled: bool) -> Self {
        self.dump_tokens = enabled;
        self
    }

    pub fn with_dump_ast(mut self, enabled: bool) -> Self {
        self.dump_ast = enabled;
        self
    }

    pub fn with_dump_ir(mut self, enabled: bool) -> Self {
        self.dump_ir = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_level_orders_o0_below_o2() {
        assert!(OptLevel::O0 < OptLevel::O2);
        assert!(OptLevel::O1 < OptLevel::O2);
    }

    #[test]
    fn color_policy_auto_follows_tty() {
        assert!(ColorPolicy::Auto.resolve(true));
        assert!(!ColorPolicy::Auto.resolve(false));
        assert!(ColorPolicy::Always.resolve(false));
        assert!(!ColorPolicy::Never.resolve(true));
    }

    #[test]
    fn warning_set_disable_unknown_name_returns_false() {
        let mut w = WarningSet::all();
        assert!(!w.disable("not-a-real-warning"));
    }

    #[test]
    fn warning_set_disable_turns_off_one_category_only() {
        let mut w = WarningSet::all();
        assert!(w.disable("shadow"));
        assert!(!w.shadow);
        assert!(w.unused_variable);
    }

    #[test]
    fn builder_methods_compose() {
        let opts = CompileOptions::new().with_opt_level(OptLevel::O2).with_error_cap(5).with_dump_ir(true);
        assert_eq!(opts.opt_level, OptLevel::O2);
        assert_eq!(opts.error_cap, 5);
        assert!(opts.dump_ir);
        assert!(!opts.dump_ast);
    }
}
