use regex::RegexBuilder;

use crate::error::{Error, Result};

/// Marker substring that identifies a recognized form-submission endpoint.
const ACTION_MARKER: &str = "formResponse";

const INVALID_FORM_MESSAGE: &str = "Could not find a valid form 'action' URL in the HTML. \
     Make sure you've pasted the full page source.";

/// Extracts the submission endpoint from raw page HTML.
///
/// Looks at the first `<form>` element only and returns its `action` value
/// unmodified. Fails with [`Error::InvalidForm`] when there is no form, no
/// `action` attribute, or the value lacks the endpoint marker.
pub fn extract_action_url(html: &str) -> Result<String> {
    let form_tag = RegexBuilder::new(r"<form\b[^>]*>")
        .case_insensitive(true)
        .build()
        .expect("valid regex");
    let tag = form_tag
        .find(html)
        .ok_or_else(|| Error::InvalidForm(INVALID_FORM_MESSAGE.into()))?;

    let action_attr = RegexBuilder::new(r#"\baction\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .case_insensitive(true)
        .build()
        .expect("valid regex");
    let url = action_attr
        .captures(tag.as_str())
        .and_then(|cap| cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::InvalidForm(INVALID_FORM_MESSAGE.into()))?;

    if !url.contains(ACTION_MARKER) {
        return Err(Error::InvalidForm(INVALID_FORM_MESSAGE.into()));
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_URL: &str = "https://docs.google.com/forms/d/e/1FAIpQL/formResponse";

    #[test]
    fn extracts_action_url_unmodified() {
        let html = format!(
            r#"<html><body><form action="{FORM_URL}" method="POST" target="_self"><input name="entry.1"></form></body></html>"#
        );
        assert_eq!(extract_action_url(&html).unwrap(), FORM_URL);
    }

    #[test]
    fn accepts_single_quoted_action() {
        let html = format!("<FORM method='post' action='{FORM_URL}'></FORM>");
        assert_eq!(extract_action_url(&html).unwrap(), FORM_URL);
    }

    #[test]
    fn uses_the_first_form_only() {
        let html = format!(
            r#"<form action="https://example.com/search"></form><form action="{FORM_URL}"></form>"#
        );
        assert!(matches!(
            extract_action_url(&html),
            Err(Error::InvalidForm(_))
        ));
    }

    #[test]
    fn rejects_html_without_a_form() {
        let err = extract_action_url("<html><body><p>no form here</p></body></html>").unwrap_err();
        assert!(matches!(err, Error::InvalidForm(_)));
        assert!(err.to_string().contains("full page source"));
    }

    #[test]
    fn rejects_form_without_action_attribute() {
        let err = extract_action_url(r#"<form method="POST"><input></form>"#).unwrap_err();
        assert!(matches!(err, Error::InvalidForm(_)));
    }

    #[test]
    fn rejects_action_without_endpoint_marker() {
        let err =
            extract_action_url(r#"<form action="https://example.com/submit"></form>"#).unwrap_err();
        assert!(matches!(err, Error::InvalidForm(_)));
    }
}
