//! crates/tutor_core/src/page.rs
//!
//! The page controller: a pure state machine that selects which page the
//! client should render next. Transitions are explicit functions of the
//! current page, the login state, and the triggering event, so they can be
//! tested without any web plumbing.

/// The pages a client can be told to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Register,
    Profile,
    Tutor,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Login => "login",
            Page::Register => "register",
            Page::Profile => "profile",
            Page::Tutor => "tutor",
        }
    }
}

/// Events that drive page transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    GoLogin,
    GoRegister,
    GoProfile,
    GoTutor,
    LoginSucceeded,
    RegisterSucceeded,
    LoggedOut,
}

impl Page {
    /// Returns the next page to render. Pages behind the login guard fall
    /// back to `Login` for anonymous sessions; a failed action keeps the
    /// current page (the form is simply re-shown), so no event exists for it.
    pub fn transition(self, logged_in: bool, event: PageEvent) -> Page {
        let requested = match event {
            PageEvent::GoLogin => Page::Login,
            PageEvent::GoRegister => Page::Register,
            PageEvent::GoProfile => Page::Profile,
            PageEvent::GoTutor => Page::Tutor,
            PageEvent::LoginSucceeded => Page::Tutor,
            PageEvent::RegisterSucceeded => Page::Login,
            PageEvent::LoggedOut => Page::Login,
        };
        match requested {
            Page::Profile | Page::Tutor if !logged_in => Page::Login,
            page => page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_leads_to_tutor() {
        assert_eq!(Page::Login.transition(true, PageEvent::LoginSucceeded), Page::Tutor);
    }

    #[test]
    fn registration_returns_to_login() {
        assert_eq!(
            Page::Register.transition(false, PageEvent::RegisterSucceeded),
            Page::Login
        );
    }

    #[test]
    fn guarded_pages_need_a_session() {
        assert_eq!(Page::Login.transition(false, PageEvent::GoTutor), Page::Login);
        assert_eq!(Page::Login.transition(false, PageEvent::GoProfile), Page::Login);
        assert_eq!(Page::Login.transition(true, PageEvent::GoProfile), Page::Profile);
        assert_eq!(Page::Profile.transition(true, PageEvent::GoTutor), Page::Tutor);
    }

    #[test]
    fn logout_lands_on_login() {
        assert_eq!(Page::Tutor.transition(false, PageEvent::LoggedOut), Page::Login);
    }
}
