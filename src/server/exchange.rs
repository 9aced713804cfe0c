use std::sync::Arc;

use uuid::Uuid;

use crate::config::SessionConfig;
use crate::http::cookie::Cookie;
use crate::http::framer::ResponseFramer;
use crate::http::request::{COOKIE, Request};
use crate::server::connection::{Connection, TransportWriter};
use crate::session::{Session, SessionStore};

const SET_COOKIE: &str = "Set-Cookie";

/// One request/response cycle over a connection.
///
/// The exchange is handed to the matched handler as an explicit parameter -
/// never looked up through ambient thread identity. It carries the parsed
/// request, the response framer, and session access wired to the store.
pub struct Exchange<'a> {
    request: Request,
    response: ResponseFramer<TransportWriter<'a>>,
    connection: &'a Connection,
    sessions: &'a SessionStore,
    session_config: &'a SessionConfig,
    session: Option<Arc<Session>>,
    session_resolved: bool,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(
        request: Request,
        response: ResponseFramer<TransportWriter<'a>>,
        connection: &'a Connection,
        sessions: &'a SessionStore,
        session_config: &'a SessionConfig,
    ) -> Self {
        Self {
            request,
            response,
            connection,
            sessions,
            session_config,
            session: None,
            session_resolved: false,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&mut self) -> &mut ResponseFramer<TransportWriter<'a>> {
        &mut self.response
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }

    /// The session this request belongs to, if it carries a valid id.
    ///
    /// Resolved once per exchange; looking it up refreshes the session's
    /// last-activity timestamp. A malformed id means "no session", not an
    /// error.
    pub fn session(&mut self) -> Option<Arc<Session>> {
        if !self.session_resolved {
            self.session = self.session_id().and_then(|id| self.sessions.get(id));
            self.session_resolved = true;
        }
        self.session.clone()
    }

    /// Creates a fresh session and, in cookie transport mode, announces its
    /// id to the client.
    pub fn create_session(&mut self) -> Arc<Session> {
        let session = self.sessions.create();
        if self.session_config.use_cookies {
            let cookie = Cookie::new(&self.session_config.name, session.id().to_string());
            self.response.add_header(SET_COOKIE, cookie.render());
        }
        self.session = Some(session.clone());
        self.session_resolved = true;
        session
    }

    /// Destroys the current session, if any, and clears the client-side id
    /// in cookie transport mode.
    pub fn destroy_session(&mut self) {
        if let Some(session) = self.session() {
            self.sessions.destroy(session.id());
            if self.session_config.use_cookies {
                let cookie = Cookie::expired(&self.session_config.name);
                self.response.add_header(SET_COOKIE, cookie.render());
            }
        }
        self.session = None;
        self.session_resolved = true;
    }

    pub(crate) fn into_response(self) -> ResponseFramer<TransportWriter<'a>> {
        self.response
    }

    /// Session id from the configured transport: a cookie or a request
    /// parameter of the configured name.
    fn session_id(&self) -> Option<Uuid> {
        let name = self.session_config.name.as_str();
        let raw = if self.session_config.use_cookies {
            Cookie::find(self.request.header(COOKIE)?, name)?
        } else {
            self.request.parameter(name)?.to_string()
        };
        Uuid::parse_str(raw.trim()).ok()
    }
}
