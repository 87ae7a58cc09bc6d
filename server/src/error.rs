use shared::MatchPhase;
use thiserror::Error;

/// Why a request was ignored. Rejections are local outcomes: the match keeps
/// running and the transport decides whether the requester hears about it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("unknown player {0}")]
    UnknownPlayer(u32),
    #[error("not allowed while the match is in {0:?}")]
    WrongPhase(MatchPhase),
    #[error("player is dead")]
    Dead,
    #[error("weapon is reloading")]
    Reloading,
    #[error("weapon is cooling down")]
    Cooldown,
    #[error("magazine is empty")]
    MagazineEmpty,
    #[error("magazine is already full")]
    MagazineFull,
    #[error("no reserve ammo left")]
    NoReserveAmmo,
    #[error("aim ray is not a finite, non-zero vector")]
    InvalidAim,
    #[error("position is not finite")]
    InvalidPosition,
    #[error("only the host may start the match")]
    NotHost,
    #[error("not every player is ready")]
    PlayersNotReady,
    #[error("unknown weapon profile '{0}'")]
    UnknownWeapon(String),
}
