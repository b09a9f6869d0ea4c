//! Request path normalisation into the manifest's `{param}` syntax.

use std::sync::LazyLock;

use regex::Regex;

/// Literal `:param` placeholders and their manifest equivalents.
///
/// Matching is per path segment, so `:repo` never rewrites `:repository_id`.
const PLACEHOLDER_RULES: &[(&str, &str)] = &[
    (":owner", "{owner}"),
    (":repo", "{repo}"),
    (":org", "{org}"),
    (":username", "{username}"),
    (":team_slug", "{team_slug}"),
    (":repository_id", "{repository_id}"),
    (":installation_id", "{installation_id}"),
    (":issue_number", "{issue_number}"),
    (":pull_number", "{pull_number}"),
    (":comment_id", "{comment_id}"),
    (":branch", "{branch}"),
    (":ref", "{ref}"),
    (":path", "{path}"),
    (":enterprise", "{enterprise}"),
];

/// Segment that introduces an optional trailing file path.
const CONTENT_LISTING_SEGMENT: &str = "contents";

/// Placeholder appended after [`CONTENT_LISTING_SEGMENT`].
const CONTENT_PATH_PLACEHOLDER: &str = "{path}";

#[expect(
    clippy::expect_used,
    reason = "the pattern is a constant and covered by unit tests"
)]
static UNRECOGNISED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":[A-Za-z_][A-Za-z0-9_]*").expect("placeholder pattern should compile")
});

/// Normalise a request path for capability lookup.
///
/// - Drops any query string.
/// - Rewrites known `:param` segments to `{param}`.
/// - Strips any other `:param` token, logging a warning.
/// - Collapses everything after a `contents` segment into `{path}`.
/// - Removes a trailing slash.
#[must_use]
pub fn normalize_path(raw_path: &str) -> String {
    let without_query = raw_path.split('?').next().unwrap_or_default();
    let mut segments: Vec<String> = Vec::new();

    for segment in without_query.split('/') {
        let translated = translate_segment(segment, raw_path);
        let is_content_listing = translated == CONTENT_LISTING_SEGMENT && !segments.is_empty();
        segments.push(translated);
        if is_content_listing {
            segments.push(String::from(CONTENT_PATH_PLACEHOLDER));
            break;
        }
    }

    let mut normalised = segments.join("/");
    while normalised.len() > 1 && normalised.ends_with('/') {
        normalised.pop();
    }
    normalised
}

fn translate_segment(segment: &str, raw_path: &str) -> String {
    if let Some((_, replacement)) = PLACEHOLDER_RULES
        .iter()
        .find(|(placeholder, _)| *placeholder == segment)
    {
        return (*replacement).to_owned();
    }

    if !UNRECOGNISED_PLACEHOLDER.is_match(segment) {
        return segment.to_owned();
    }

    for token in UNRECOGNISED_PLACEHOLDER.find_iter(segment) {
        tracing::warn!(
            token = token.as_str(),
            path = raw_path,
            "unrecognised path placeholder stripped before permission lookup"
        );
    }
    UNRECOGNISED_PLACEHOLDER.replace_all(segment, "").into_owned()
}

/// Drop the final segment of a normalised path.
pub(super) fn parent_path(path: &str) -> Option<&str> {
    let (parent, _) = path.rsplit_once('/')?;
    (!parent.is_empty()).then_some(parent)
}
