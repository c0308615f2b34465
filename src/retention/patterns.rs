use regex::RegexSet;

use super::error::ConfigError;

/// Keys a file is matched on: its name, and its path relative to the
/// retention root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
    pub name: String,
    pub relative: String,
}

/// A compiled list of glob patterns.
///
/// Patterns without a `/` are matched against the file name, patterns with a
/// `/` against the root-relative path. `*` and `?` never cross a `/`; `**`
/// does.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    name_set: RegexSet,
    name_index: Vec<usize>,
    path_set: RegexSet,
    path_index: Vec<usize>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S], root: &str) -> Result<Self, ConfigError> {
        let mut name_regexes = Vec::new();
        let mut name_index = Vec::new();
        let mut path_regexes = Vec::new();
        let mut path_index = Vec::new();
        let mut kept = Vec::with_capacity(patterns.len());

        for (i, raw) in patterns.iter().enumerate() {
            let raw = raw.as_ref();
            let pattern = relativize(raw, root);
            let regex = glob_to_regex(pattern);
            // Validate one at a time so the error names the offending pattern.
            regex::Regex::new(&regex).map_err(|source| ConfigError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?;
            if pattern.contains('/') {
                path_regexes.push(regex);
                path_index.push(i);
            } else {
                name_regexes.push(regex);
                name_index.push(i);
            }
            kept.push(raw.to_string());
        }

        let build = |regexes: &[String]| {
            RegexSet::new(regexes).map_err(|source| ConfigError::InvalidPattern {
                pattern: kept.join(", "),
                source,
            })
        };

        Ok(PatternSet {
            name_set: build(&name_regexes)?,
            path_set: build(&path_regexes)?,
            name_index,
            path_index,
            patterns: kept,
        })
    }

    pub fn empty() -> Self {
        PatternSet {
            patterns: Vec::new(),
            name_set: RegexSet::empty(),
            name_index: Vec::new(),
            path_set: RegexSet::empty(),
            path_index: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_match(&self, key: &MatchKey) -> bool {
        (!self.name_index.is_empty() && self.name_set.is_match(&key.name))
            || (!self.path_index.is_empty() && self.path_set.is_match(&key.relative))
    }

    /// Indices (into the original pattern list) of every pattern matching `key`,
    /// ascending.
    pub fn matching(&self, key: &MatchKey) -> Vec<usize> {
        let mut hits: Vec<usize> = Vec::new();
        if !self.name_index.is_empty() {
            hits.extend(self.name_set.matches(&key.name).iter().map(|i| self.name_index[i]));
        }
        if !self.path_index.is_empty() {
            hits.extend(self.path_set.matches(&key.relative).iter().map(|i| self.path_index[i]));
        }
        hits.sort_unstable();
        hits
    }
}

/// Absolute patterns pointing inside the root are rewritten relative to it.
fn relativize<'a>(pattern: &'a str, root: &str) -> &'a str {
    let root = root.trim_end_matches('/');
    if root.is_empty() || !pattern.starts_with('/') {
        return pattern;
    }
    pattern
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(pattern)
}

/// Translates an fnmatch-style glob into an anchored regex.
pub(crate) fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    let at_segment_start = i == 0 || chars[i - 1] == '/';
                    i += 2;
                    if at_segment_start && chars.get(i) == Some(&'/') {
                        // `**/` matches zero or more whole directories.
                        out.push_str("(?:[^/]*/)*");
                        i += 1;
                    } else {
                        out.push_str(".*");
                    }
                    continue;
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if chars[j] == '!' || chars[j] == '^' {
                        // Negation never admits the separator.
                        out.push_str("^/");
                        j += 1;
                    }
                    while j < end {
                        let cc = chars[j];
                        if cc == '\\' || cc == '[' || cc == ']' || cc == '&' || cc == '~' {
                            out.push('\\');
                        }
                        out.push(cc);
                        j += 1;
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`, if any. A `]`
/// directly after the opening bracket (or its negation) is a literal.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}
