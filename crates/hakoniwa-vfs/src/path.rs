//! Path normalization.
//!
//! Store keys are normalized absolute strings: a leading `/`, no `.` or `..`
//! segments, no doubled separators, and no trailing separator except on the
//! root itself. Guest paths arrive in any shape and are folded into that form
//! against the process working directory.

/// Path separator.
pub const SEPARATOR: char = '/';

/// The root path.
pub const ROOT: &str = "/";

/// Resolve `path` against `cwd` into a normalized absolute path.
///
/// `..` at the root stays at the root.
pub fn abs_path(cwd: &str, path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if !path.starts_with(SEPARATOR) {
        push_segments(&mut segments, cwd);
    }
    push_segments(&mut segments, path);

    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut result = String::with_capacity(path.len() + cwd.len());
    for segment in segments {
        result.push(SEPARATOR);
        result.push_str(segment);
    }
    result
}

fn push_segments<'a>(segments: &mut Vec<&'a str>, path: &'a str) {
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
}

/// Every prefix of a normalized path, from the root through `path` itself.
///
/// `dirs("/a/b")` is `["/", "/a", "/a/b"]`.
pub fn dirs(path: &str) -> Vec<String> {
    let mut result = vec![ROOT.to_string()];
    let mut current = String::new();
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        current.push(SEPARATOR);
        current.push_str(segment);
        result.push(current.clone());
    }
    result
}

/// Parent of a normalized path. The root has no parent.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some(ROOT),
        Some(pos) => Some(&path[..pos]),
        None => None,
    }
}

/// Final segment of a normalized path (empty for the root).
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Join a normalized directory with a relative name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Prefix shared by every key strictly under `dir`.
pub fn child_prefix(dir: &str) -> String {
    if dir == ROOT {
        ROOT.to_string()
    } else {
        format!("{}/", dir)
    }
}

/// True if `path` is `dir` or lies anywhere beneath it.
pub fn is_within(path: &str, dir: &str) -> bool {
    path == dir || path.starts_with(&child_prefix(dir))
}
