//! Path templates, the repository formatter, and object paths.
//!
//! Every artifact in a mirrored index tree lives at a location derived from
//! `(period type, date)` through a [`RepoFormat`]: an ordered list of path
//! templates plus one leaf-name template per period type. The default EDGAR
//! layout is
//!
//! ```text
//! D/2020/QTR1/master20200125.idx      path_spec = ["{t}", "{y}", "QTR{q}"]
//! Q/2020/QTR1/master.idx              name_spec = {D: "master{y}{m:02}{d:02}.idx",
//!                                                  Q: "master.idx"}
//! ```
//!
//! Templates are macro strings compiled once into token lists and then
//! rendered (or matched back) in a single pass. The recognized macros are
//! `{y}` (year), `{m}` (month), `{d}` (day), `{q}` (quarter 1..4) and `{t}`
//! (period-type letter); integer macros accept a zero-pad width as in
//! `{m:02}`. Additional macros can be registered on a [`RepoFormatter`] as
//! closures over `(period, date)`, which is how the remote EDGAR layout
//! resolves `{index}` to `daily-index` / `full-index`.
//!
//! [`RepoObjectPath`] is the canonical location of one artifact: it can be
//! built from a date, a URI, a component list, or an existing repository
//! object, and queried back for the period type, year, quarter, and date.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::calendar::{Date, PeriodType};
use crate::error::{MirrorError, Result};
use crate::repo::RepoObject;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Macro { name: String, width: Option<usize> },
}

impl Token {
    /// Rendered length when it is knowable without a value, used to anchor
    /// unsized macros during extraction.
    fn fixed_len(&self) -> Option<usize> {
        match self {
            Token::Literal(s) => Some(s.len()),
            Token::Macro { width, .. } => *width,
        }
    }
}

/// A macro template compiled into a token list.
///
/// Compilation is total: text that does not form a `{name}` or `{name:0N}`
/// group is kept as a literal, so a template never fails to build, only to
/// render (unknown macro) or to match (shape mismatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    tokens: Vec<Token>,
}

impl Template {
    pub fn compile(spec: &str) -> Self {
        let mut tokens: Vec<Token> = Vec::new();
        let mut literal = String::new();
        let mut rest = spec;

        while let Some(open) = rest.find('{') {
            let (before, tail) = rest.split_at(open);
            literal.push_str(before);
            match tail[1..].find('}') {
                Some(close) => {
                    let inner = &tail[1..1 + close];
                    match Self::parse_macro(inner) {
                        Some((name, width)) => {
                            if !literal.is_empty() {
                                tokens.push(Token::Literal(std::mem::take(&mut literal)));
                            }
                            tokens.push(Token::Macro { name, width });
                        }
                        None => literal.push_str(&tail[..close + 2]),
                    }
                    rest = &tail[close + 2..];
                }
                None => {
                    literal.push_str(tail);
                    rest = "";
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Template {
            raw: spec.to_string(),
            tokens,
        }
    }

    /// Splits `name` or `name:0N` into a macro name and pad width.
    fn parse_macro(inner: &str) -> Option<(String, Option<usize>)> {
        let (name, spec) = match inner.split_once(':') {
            Some((name, spec)) => (name, Some(spec)),
            None => (inner, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        let width = match spec {
            None => None,
            Some(s) => {
                let digits = s.strip_prefix('0').unwrap_or(s);
                match digits.parse::<usize>() {
                    Ok(w) if w > 0 => Some(w),
                    _ => return None,
                }
            }
        };
        Some((name.to_string(), width))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn contains_macro(&self, name: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Macro { name: n, .. } if n == name))
    }

    /// Substitutes macros for the given period and date. `extras` resolves
    /// macros outside the built-in set; an unresolvable macro is an error.
    pub fn render(
        &self,
        period: Option<PeriodType>,
        date: Date,
        extras: &HashMap<String, String>,
    ) -> Result<String> {
        let mut out = String::with_capacity(self.raw.len());
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Macro { name, width } => {
                    let number = match name.as_str() {
                        "y" => Some(date.year() as i64),
                        "m" => Some(date.month() as i64),
                        "d" => Some(date.day() as i64),
                        "q" => Some(date.quarter() as i64),
                        _ => None,
                    };
                    match (number, name.as_str()) {
                        (Some(n), _) => match width {
                            Some(w) => out.push_str(&format!("{n:0width$}", width = *w)),
                            None => out.push_str(&n.to_string()),
                        },
                        (None, "t") => {
                            if let Some(p) = period {
                                out.push_str(p.as_str());
                            }
                        }
                        (None, other) => match extras.get(other) {
                            Some(v) => out.push_str(v),
                            None => {
                                return Err(MirrorError::InvalidTemplate(format!(
                                    "unresolved macro {{{other}}} in {:?}",
                                    self.raw
                                )));
                            }
                        },
                    }
                }
            }
        }
        Ok(out)
    }

    /// The inverse of [`Template::render`]: matches `component` against the
    /// token list and returns the substring captured by each macro.
    ///
    /// A macro without a pad width is anchored by the combined fixed length
    /// of everything after it, so at most the trailing run of sized macros
    /// and literals may follow one; two unsized macros in one template cannot
    /// be told apart and are rejected.
    pub fn extract(&self, component: &str) -> Result<HashMap<String, String>> {
        let mismatch = || {
            MirrorError::InvalidPath(format!(
                "{component:?} does not match template {:?}",
                self.raw
            ))
        };

        let mut values = HashMap::new();
        let mut pos = 0usize;
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Literal(s) => {
                    if !component[pos..].starts_with(s.as_str()) {
                        return Err(mismatch());
                    }
                    pos += s.len();
                }
                Token::Macro { name, width } => {
                    let take = match width {
                        Some(w) => *w,
                        None => {
                            let tail: Option<usize> = self.tokens[i + 1..]
                                .iter()
                                .map(Token::fixed_len)
                                .sum();
                            let tail = tail.ok_or_else(|| {
                                MirrorError::InvalidTemplate(format!(
                                    "ambiguous template {:?}: two unsized macros",
                                    self.raw
                                ))
                            })?;
                            (component.len() - pos)
                                .checked_sub(tail)
                                .ok_or_else(mismatch)?
                        }
                    };
                    if pos + take > component.len()
                        || !component.is_char_boundary(pos)
                        || !component.is_char_boundary(pos + take)
                    {
                        return Err(mismatch());
                    }
                    values.insert(name.clone(), component[pos..pos + take].to_string());
                    pos += take;
                }
            }
        }
        if pos != component.len() {
            return Err(mismatch());
        }
        Ok(values)
    }
}

/// The layout of a repository: leaf-name templates per period type plus the
/// ordered directory templates above them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFormat {
    name_spec: HashMap<PeriodType, Template>,
    path_spec: Vec<Template>,
}

impl RepoFormat {
    pub fn new(name_specs: &[(PeriodType, &str)], path_spec: &[&str]) -> Self {
        RepoFormat {
            name_spec: name_specs
                .iter()
                .map(|(p, s)| (*p, Template::compile(s)))
                .collect(),
            path_spec: path_spec.iter().map(|s| Template::compile(s)).collect(),
        }
    }

    /// The default sink layout: `{t}/{y}/QTR{q}/master....idx`.
    pub fn edgar_default() -> Self {
        Self::new(
            &[
                (PeriodType::Day, "master{y}{m:02}{d:02}.idx"),
                (PeriodType::Quarter, "master.idx"),
            ],
            &["{t}", "{y}", "QTR{q}"],
        )
    }

    /// The default source layout used by the EDGAR archives, with the
    /// `{index}` macro selecting `daily-index` or `full-index`.
    pub fn edgar_source() -> Self {
        Self::new(
            &[
                (PeriodType::Day, "master.{y}{m:02}{d:02}.idx"),
                (PeriodType::Quarter, "master.idx"),
            ],
            &["{index}", "{y}", "QTR{q}"],
        )
    }

    pub fn name_template(&self, period: PeriodType) -> Result<&Template> {
        self.name_spec.get(&period).ok_or_else(|| {
            MirrorError::InvalidTemplate(format!("no name template for period {period}"))
        })
    }

    pub fn path_spec(&self) -> &[Template] {
        &self.path_spec
    }

    /// Number of components in a full object path: the directories plus the
    /// leaf name.
    pub fn path_len(&self) -> usize {
        self.path_spec.len() + 1
    }
}

/// Callback resolving a user macro for a `(period, date)` pair.
pub type MacroFn = Box<dyn Fn(PeriodType, Date) -> String + Send + Sync>;

/// Renders `(period, date)` into path components under a [`RepoFormat`],
/// consulting registered user macros for anything outside the built-ins.
pub struct RepoFormatter {
    format: Arc<RepoFormat>,
    macros: HashMap<String, MacroFn>,
}

impl RepoFormatter {
    pub fn new(format: RepoFormat) -> Self {
        RepoFormatter {
            format: Arc::new(format),
            macros: HashMap::new(),
        }
    }

    /// Registers a user macro; a later registration under the same name wins.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(PeriodType, Date) -> String + Send + Sync + 'static,
    {
        self.macros.insert(name.into(), Box::new(f));
    }

    pub fn repo_format(&self) -> &Arc<RepoFormat> {
        &self.format
    }

    /// Renders the full component list for one artifact: every path template
    /// in order, then the leaf name for the period type.
    pub fn format(&self, period: PeriodType, date: Date) -> Result<Vec<String>> {
        self.format_with(period, date, &HashMap::new())
    }

    /// Like [`RepoFormatter::format`], with extra one-off macro values that
    /// take precedence over registered closures.
    pub fn format_with(
        &self,
        period: PeriodType,
        date: Date,
        extras: &HashMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut resolved: HashMap<String, String> = self
            .macros
            .iter()
            .map(|(name, f)| (name.clone(), f(period, date)))
            .collect();
        for (k, v) in extras {
            resolved.insert(k.clone(), v.clone());
        }

        let mut components = Vec::with_capacity(self.format.path_len());
        for template in self.format.path_spec() {
            components.push(template.render(Some(period), date, &resolved)?);
        }
        components.push(
            self.format
                .name_template(period)?
                .render(Some(period), date, &resolved)?,
        );
        Ok(components)
    }
}

impl fmt::Debug for RepoFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoFormatter")
            .field("format", &self.format)
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The canonical location of one artifact inside a repository tree.
///
/// Stores the ordered component list; the period type and date are kept when
/// the path was built from them and recovered from the components otherwise.
#[derive(Debug, Clone)]
pub struct RepoObjectPath {
    components: Vec<String>,
    format: Arc<RepoFormat>,
    period_type: Option<PeriodType>,
    date: Option<Date>,
}

impl RepoObjectPath {
    /// Builds a path from a slash-joined URI.
    pub fn from_uri(uri: &str, format: Arc<RepoFormat>) -> Self {
        Self::from_components(
            uri.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect(),
            format,
        )
    }

    pub fn from_components(components: Vec<String>, format: Arc<RepoFormat>) -> Self {
        RepoObjectPath {
            components,
            format,
            period_type: None,
            date: None,
        }
    }

    /// Builds the canonical path for `(period, date)` through a formatter.
    pub fn from_date(
        period: PeriodType,
        date: Date,
        formatter: &RepoFormatter,
    ) -> Result<Self> {
        Ok(RepoObjectPath {
            components: formatter.format(period, date)?,
            format: Arc::clone(formatter.repo_format()),
            period_type: Some(period),
            date: Some(date),
        })
    }

    /// Recovers the path of an existing repository object from its trailing
    /// `path_len` name components.
    pub fn from_object(object: &dyn RepoObject, format: Arc<RepoFormat>) -> Self {
        let components = object.subpath(format.path_len());
        Self::from_components(components, format)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    /// The leaf (object name) component.
    pub fn leaf(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// The slash-joined relative URI.
    pub fn uri(&self) -> String {
        self.components.join("/")
    }

    /// The slash-joined URI of the enclosing directory.
    pub fn parent_uri(&self) -> String {
        match self.components.split_last() {
            Some((_, dirs)) => dirs.join("/"),
            None => String::new(),
        }
    }

    /// Extracts the value of a named macro from the path components, using
    /// the first path template that mentions it.
    pub fn param(&self, name: &str) -> Result<String> {
        for (template, component) in self
            .format
            .path_spec()
            .iter()
            .zip(self.components.iter())
        {
            if template.contains_macro(name) {
                let mut values = template.extract(component)?;
                return values.remove(name).ok_or_else(|| {
                    MirrorError::InvalidPath(format!("macro {{{name}}} not captured"))
                });
            }
        }
        Err(MirrorError::InvalidPath(format!(
            "no path template carries {{{name}}}"
        )))
    }

    /// The period type of the artifact at this path.
    pub fn period_type(&self) -> Result<PeriodType> {
        match self.period_type {
            Some(p) => Ok(p),
            None => self.param("t")?.parse(),
        }
    }

    /// The year of the artifact at this path.
    pub fn year(&self) -> Result<i32> {
        match self.date {
            Some(d) => Ok(d.year()),
            None => self
                .param("y")?
                .parse()
                .map_err(|_| MirrorError::InvalidPath(self.uri())),
        }
    }

    /// The quarter of the artifact at this path.
    pub fn quarter(&self) -> Result<u32> {
        match self.date {
            Some(d) => Ok(d.quarter()),
            None => self
                .param("q")?
                .parse()
                .map_err(|_| MirrorError::InvalidPath(self.uri())),
        }
    }

    /// The date of the artifact at this path.
    ///
    /// When the path was not built from a date, the date is recovered from
    /// the leaf component using the daily name template, so it is only
    /// defined for day-period paths.
    pub fn date(&self) -> Result<Date> {
        if let Some(d) = self.date {
            return Ok(d);
        }
        let leaf = self
            .leaf()
            .ok_or_else(|| MirrorError::InvalidPath("empty object path".to_string()))?;
        let values = self.format.name_template(PeriodType::Day)?.extract(leaf)?;
        let field = |name: &str| -> Result<u32> {
            values
                .get(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| MirrorError::InvalidPath(self.uri()))
        };
        Date::from_ymd(field("y")? as i32, field("m")?, field("d")?)
    }
}

impl PartialEq for RepoObjectPath {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for RepoObjectPath {}

impl fmt::Display for RepoObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Date {
        Date::parse(s).unwrap()
    }

    #[test]
    fn compile_splits_literals_and_macros() {
        let t = Template::compile("master{y}{m:02}{d:02}.idx");
        assert!(t.contains_macro("y"));
        assert!(t.contains_macro("m"));
        assert!(!t.contains_macro("q"));
        assert_eq!(t.raw(), "master{y}{m:02}{d:02}.idx");
    }

    #[test]
    fn compile_keeps_malformed_groups_as_literals() {
        let t = Template::compile("QTR{q} {not closed");
        let rendered = t
            .render(None, d("2020-03-07"), &HashMap::new())
            .unwrap();
        assert_eq!(rendered, "QTR1 {not closed");
    }

    #[test]
    fn render_default_day_name() {
        let t = Template::compile("master{y}{m:02}{d:02}.idx");
        let out = t
            .render(Some(PeriodType::Day), d("2020-01-25"), &HashMap::new())
            .unwrap();
        assert_eq!(out, "master20200125.idx");
    }

    #[test]
    fn render_period_letter_and_quarter() {
        let t = Template::compile("{t}/{y}/QTR{q}");
        let out = t
            .render(Some(PeriodType::Quarter), d("2020-03-07"), &HashMap::new())
            .unwrap();
        assert_eq!(out, "Q/2020/QTR1");
    }

    #[test]
    fn render_unknown_macro_is_an_error() {
        let t = Template::compile("{nope}");
        assert!(matches!(
            t.render(None, d("2020-01-01"), &HashMap::new()),
            Err(MirrorError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn extract_recovers_macro_values() {
        let t = Template::compile("master{y}{m:02}{d:02}.idx");
        let values = t.extract("master20200125.idx").unwrap();
        assert_eq!(values["y"], "2020");
        assert_eq!(values["m"], "01");
        assert_eq!(values["d"], "25");

        let t = Template::compile("QTR{q}");
        assert_eq!(t.extract("QTR4").unwrap()["q"], "4");
    }

    #[test]
    fn extract_rejects_mismatched_components() {
        let t = Template::compile("QTR{q}");
        assert!(t.extract("2020").is_err());
        let t = Template::compile("master{y}{m:02}{d:02}.idx");
        assert!(t.extract("master.idx").is_err());
    }

    #[test]
    fn extract_rejects_double_unsized_macros() {
        let t = Template::compile("{a}{b}");
        assert!(matches!(
            t.extract("xy"),
            Err(MirrorError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn formatter_default_layout() {
        let formatter = RepoFormatter::new(RepoFormat::edgar_default());
        let day = formatter.format(PeriodType::Day, d("2020-01-25")).unwrap();
        assert_eq!(day.join("/"), "D/2020/QTR1/master20200125.idx");
        let quarter = formatter
            .format(PeriodType::Quarter, d("2020-03-07"))
            .unwrap();
        assert_eq!(quarter.join("/"), "Q/2020/QTR1/master.idx");
    }

    #[test]
    fn formatter_one_off_extras() {
        let formatter = RepoFormatter::new(RepoFormat::new(
            &[(PeriodType::Day, "master{y}{m:02}{d:02}.idx")],
            &["{z}", "{y}", "QTR{q}"],
        ));
        let mut extras = HashMap::new();
        extras.insert("z".to_string(), "X".to_string());
        let path = formatter
            .format_with(PeriodType::Day, d("2020-03-07"), &extras)
            .unwrap();
        assert_eq!(path.join("/"), "X/2020/QTR1/master20200307.idx");
    }

    #[test]
    fn formatter_registered_macros() {
        let mut formatter = RepoFormatter::new(RepoFormat::new(
            &[
                (PeriodType::Day, "master{y}{m:02}{d:02}.idx"),
                (PeriodType::Quarter, "master.idx"),
            ],
            &["{z}", "{y}", "QTR{q}"],
        ));
        formatter.register("z", |period, _| {
            match period {
                PeriodType::Day => "DAY",
                PeriodType::Quarter => "QUARTER",
            }
            .to_string()
        });
        let day = formatter.format(PeriodType::Day, d("2020-03-07")).unwrap();
        assert_eq!(day.join("/"), "DAY/2020/QTR1/master20200307.idx");
        let quarter = formatter
            .format(PeriodType::Quarter, d("2020-03-07"))
            .unwrap();
        assert_eq!(quarter.join("/"), "QUARTER/2020/QTR1/master.idx");
    }

    #[test]
    fn path_round_trip() {
        let formatter = RepoFormatter::new(RepoFormat::edgar_default());
        for (period, date) in [
            (PeriodType::Day, d("2020-01-25")),
            (PeriodType::Day, d("2017-11-20")),
            (PeriodType::Quarter, d("2018-01-01")),
        ] {
            let built = RepoObjectPath::from_date(period, date, &formatter).unwrap();
            let parsed = RepoObjectPath::from_uri(
                &built.uri(),
                Arc::clone(formatter.repo_format()),
            );
            assert_eq!(parsed.period_type().unwrap(), period);
            assert_eq!(parsed.year().unwrap(), date.year());
            assert_eq!(parsed.quarter().unwrap(), date.quarter());
            if period == PeriodType::Day {
                assert_eq!(parsed.date().unwrap(), date);
            }
        }
    }

    #[test]
    fn path_params_from_uri() {
        let format = Arc::new(RepoFormat::edgar_default());
        let path = RepoObjectPath::from_uri("D/2020/QTR1/master20200125.idx", Arc::clone(&format));
        assert_eq!(path.period_type().unwrap(), PeriodType::Day);
        assert_eq!(path.year().unwrap(), 2020);
        assert_eq!(path.quarter().unwrap(), 1);
        assert_eq!(path.date().unwrap(), d("2020-01-25"));
        assert_eq!(path.parent_uri(), "D/2020/QTR1");
        assert_eq!(path.leaf(), Some("master20200125.idx"));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn quarter_path_has_no_date() {
        let format = Arc::new(RepoFormat::edgar_default());
        let path = RepoObjectPath::from_uri("Q/2020/QTR1/master.idx", format);
        assert_eq!(path.period_type().unwrap(), PeriodType::Quarter);
        assert!(path.date().is_err());
    }
}
