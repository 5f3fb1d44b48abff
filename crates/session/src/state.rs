//! États de connexion d'une session

use std::fmt;

/// État de connexion observable
///
/// ```text
/// Disconnected → Connecting → Connected
///                    │            │
///                    └──→ Error ←─┘
/// ```
/// `Disconnected` est atteignable depuis tout état par une fermeture.
/// `Error` est terminal pour la session : réessayer demande une nouvelle session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Vrai tant que la session tient des ressources
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Transitions autorisées de la machine à états
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Error)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Error, Disconnected)
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Déconnecté",
            ConnectionState::Connecting => "Connexion en cours",
            ConnectionState::Connected => "Connecté",
            ConnectionState::Error => "Erreur",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Error));
        assert!(Error.can_transition_to(Disconnected));

        // Error est terminal, Connected ne se saute pas
        assert!(!Error.can_transition_to(Connecting));
        assert!(!Error.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Connected));
    }

    #[test]
    fn test_activity() {
        assert!(!ConnectionState::default().is_active());
        assert!(Connecting.is_active());
        assert!(Connected.is_active());
        assert!(!Error.is_active());
        assert_eq!(Connected.to_string(), "Connecté");
    }
}
