use async_graphql::Context;
use axum::http::HeaderMap;
use bson::Uuid;
use serde::{Deserialize, Serialize};

/// Content of the `Authorized-User` HTTP header set by the gateway.
///
/// The header value is a JSON object, for example:
/// `{"id": "53e8d5b6-...", "roles": ["moderator"]}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthorizedUserHeader {
    pub id: Uuid,
    pub roles: Vec<Role>,
}

/// Role of an authenticated user, assigned by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Moderator,
}

impl TryFrom<&HeaderMap> for AuthorizedUserHeader {
    type Error = ();

    /// Parses the `Authorized-User` header. Absent or malformed headers leave
    /// the request anonymous rather than failing it.
    fn try_from(header_map: &HeaderMap) -> Result<Self, Self::Error> {
        let header_value = header_map.get("Authorized-User").ok_or(())?;
        let json = header_value.to_str().map_err(|_| ())?;
        serde_json::from_str(json).map_err(|_| ())
    }
}

/// The entity performing an operation, resolved once per request and threaded
/// explicitly through every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User { id: Uuid, is_moderator: bool },
}

impl Actor {
    /// Resolves the actor from the parsed `Authorized-User` header in the
    /// request context, falling back to `Anonymous`.
    pub fn from_context(ctx: &Context<'_>) -> Self {
        match ctx.data_opt::<AuthorizedUserHeader>() {
            Some(header) => Actor::User {
                id: header.id,
                is_moderator: header.roles.contains(&Role::Moderator),
            },
            None => Actor::Anonymous,
        }
    }

    /// UUID of the authenticated user, if any.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Anonymous => None,
            Actor::User { id, .. } => Some(*id),
        }
    }

    pub fn is_moderator(&self) -> bool {
        matches!(
            self,
            Actor::User {
                is_moderator: true,
                ..
            }
        )
    }
}

/// Network origin of the client submitting a request, captured for anti-abuse
/// auditing only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

impl TryFrom<&HeaderMap> for ClientOrigin {
    type Error = ();

    fn try_from(header_map: &HeaderMap) -> Result<Self, Self::Error> {
        let header_value = header_map.get("X-Forwarded-For").ok_or(())?;
        let forwarded = header_value.to_str().map_err(|_| ())?;
        // The first entry in the chain is the originating client.
        let origin = forwarded.split(',').next().unwrap_or(forwarded).trim();
        if origin.is_empty() {
            return Err(());
        }
        Ok(ClientOrigin(origin.to_string()))
    }
}

/// Locale tag of the submitting client, captured at submission time for
/// reporting and never revalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLocale(pub String);

impl TryFrom<&HeaderMap> for ClientLocale {
    type Error = ();

    fn try_from(header_map: &HeaderMap) -> Result<Self, Self::Error> {
        let header_value = header_map.get("Accept-Language").ok_or(())?;
        let languages = header_value.to_str().map_err(|_| ())?;
        let locale = languages
            .split(',')
            .next()
            .unwrap_or(languages)
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if locale.is_empty() {
            return Err(());
        }
        Ok(ClientLocale(locale.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut header_map = HeaderMap::new();
        header_map.insert(name, HeaderValue::from_str(value).unwrap());
        header_map
    }

    #[test]
    fn parses_authorized_user_header() {
        let id = Uuid::new();
        let header_map = headers_with(
            "Authorized-User",
            &format!("{{\"id\": \"{}\", \"roles\": [\"moderator\"]}}", id),
        );
        let header = AuthorizedUserHeader::try_from(&header_map).unwrap();
        assert_eq!(header.id, id);
        assert_eq!(header.roles, vec![Role::Moderator]);
    }

    #[test]
    fn rejects_malformed_authorized_user_header() {
        let header_map = headers_with("Authorized-User", "not json");
        assert!(AuthorizedUserHeader::try_from(&header_map).is_err());
    }

    #[test]
    fn client_origin_takes_first_forwarded_entry() {
        let header_map = headers_with("X-Forwarded-For", "203.0.113.7, 10.0.0.1");
        let origin = ClientOrigin::try_from(&header_map).unwrap();
        assert_eq!(origin, ClientOrigin("203.0.113.7".to_string()));
    }

    #[test]
    fn client_locale_strips_quality_parameters() {
        let header_map = headers_with("Accept-Language", "de-DE;q=0.9, en;q=0.8");
        let locale = ClientLocale::try_from(&header_map).unwrap();
        assert_eq!(locale, ClientLocale("de-DE".to_string()));
    }
}
