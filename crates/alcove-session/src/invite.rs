//! Shareable invite links.
//!
//! The token rides in the URL *fragment*, so it never appears in a request
//! path a server could log: `<app-base>#/portal?token=<token>&tab=<tab>`.
//! Decoding an invite only pre-fills the token; whoever received the link
//! still has to confirm entry themselves.

use url::Url;
use url::form_urlencoded;

/// Which view the invite opens on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortalTab {
    #[default]
    Messages,
    Files,
    Encrypt,
}

impl PortalTab {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Files => "files",
            Self::Encrypt => "encrypt",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "messages" => Some(Self::Messages),
            "files" => Some(Self::Files),
            "encrypt" => Some(Self::Encrypt),
            _ => None,
        }
    }
}

/// A decoded invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub token: String,
    pub tab: PortalTab,
}

/// Embed a token into a shareable link under `app_base`.
pub fn encode(app_base: &Url, token: &str, tab: PortalTab) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .append_pair("tab", tab.as_str())
        .finish();

    let mut link = app_base.clone();
    link.set_fragment(Some(&format!("/portal?{query}")));
    link.to_string()
}

/// Extract the token (and tab) back out of an invite link.
///
/// Returns `None` for anything that is not a well-formed portal fragment
/// with a non-empty token. An unknown tab falls back to the default rather
/// than invalidating the whole invite.
pub fn decode(link: &str) -> Option<Invite> {
    let url = Url::parse(link).ok()?;
    let fragment = url.fragment()?;
    let query = fragment.strip_prefix("/portal?")?;

    let mut token = None;
    let mut tab = PortalTab::default();
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "token" => token = Some(value.into_owned()),
            "tab" => {
                if let Some(parsed) = PortalTab::parse(&value) {
                    tab = parsed;
                }
            }
            _ => {}
        }
    }

    let token = token.filter(|t| !t.is_empty())?;
    Some(Invite { token, tab })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://alcove.example/app").unwrap()
    }

    #[test]
    fn encode_produces_the_portal_fragment() {
        let link = encode(&base(), "abc12345", PortalTab::Files);
        assert_eq!(
            link,
            "https://alcove.example/app#/portal?token=abc12345&tab=files"
        );
    }

    #[test]
    fn round_trip_plain_token() {
        let link = encode(&base(), "abc12345", PortalTab::Messages);
        let invite = decode(&link).unwrap();
        assert_eq!(invite.token, "abc12345");
        assert_eq!(invite.tab, PortalTab::Messages);
    }

    #[test]
    fn round_trip_full_character_set() {
        for token in [
            "with space & ampersand",
            "equals=plus+percent%",
            "unicode-émoji-日本語",
            "quo\"te'#frag?",
        ] {
            let link = encode(&base(), token, PortalTab::Encrypt);
            let invite = decode(&link).unwrap();
            assert_eq!(invite.token, token, "token mangled in {link}");
            assert_eq!(invite.tab, PortalTab::Encrypt);
        }
    }

    #[test]
    fn unknown_tab_falls_back_to_messages() {
        let invite = decode("https://alcove.example/app#/portal?token=abc12345&tab=voice").unwrap();
        assert_eq!(invite.tab, PortalTab::Messages);
    }

    #[test]
    fn non_portal_links_are_rejected() {
        assert_eq!(decode("not a url at all"), None);
        assert_eq!(decode("https://alcove.example/app"), None);
        assert_eq!(decode("https://alcove.example/app#/settings?token=abc12345"), None);
        assert_eq!(decode("https://alcove.example/app#/portal?tab=files"), None);
        assert_eq!(decode("https://alcove.example/app#/portal?token="), None);
    }
}
