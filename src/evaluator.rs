// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! The relationship permission evaluator: a pure, total function from an
//! already-fetched pair snapshot to an interaction decision. No I/O happens
//! here; the gatekeeper assembles snapshots and the store stays behind its
//! own boundary.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::presence::PresenceRecord;
use crate::models::relation::MuteFlags;

/// The interactions gated between a pair of users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interaction {
    ViewProfile,
    ViewPost,
    SendMessage,
    ViewStory,
    Comment,
    SearchAppear,
}

impl Interaction {
    pub const ALL: [Interaction; 6] = [
        Interaction::ViewProfile,
        Interaction::ViewPost,
        Interaction::SendMessage,
        Interaction::ViewStory,
        Interaction::Comment,
        Interaction::SearchAppear,
    ];
}

impl FromStr for Interaction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view-profile" => Ok(Interaction::ViewProfile),
            "view-post" => Ok(Interaction::ViewPost),
            "send-message" => Ok(Interaction::SendMessage),
            "view-story" => Ok(Interaction::ViewStory),
            "comment" => Ok(Interaction::Comment),
            "search-appear" => Ok(Interaction::SearchAppear),
            other => Err(format!("unknown interaction: {}", other)),
        }
    }
}

/// Aggregated feed surfaces, for mute-driven exclusion only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    PostFeed,
    StoryFeed,
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Surface::PostFeed),
            "stories" => Ok(Surface::StoryFeed),
            other => Err(format!("unknown feed surface: {}", other)),
        }
    }
}

/// Why an interaction was denied. Never carries edge direction: the blocker
/// and the blocked party receive the identical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Suspended,
    Blocked,
}

/// What an allowed-with-suppression interaction hides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    /// Content goes live only for its author and queues for the
    /// restrictor's approval; the author sees normal posting.
    Restricted,
}

/// Presence detail attached to allowed DM-surface decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub is_online: bool,
    pub last_seen: NaiveDateTime,
}

/// Outcome of evaluating one interaction for one ordered pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allowed { presence: Option<PresenceInfo> },
    Denied { reason: DenialReason },
    AllowedWithSuppression { what: Suppression },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied { .. })
    }
}

/// The relation, ban and presence facts for one ordered (actor, target)
/// pair at decision time. Absence of a fact is the permissive default: no
/// ban row means clear, no relation row means no effect (§ error design —
/// availability over false suspicion).
#[derive(Debug, Clone, Default)]
pub struct PairSnapshot {
    pub actor_suspended: bool,
    pub target_suspended: bool,
    /// Administrators still see suspended targets' content.
    pub actor_is_admin: bool,
    pub actor_blocks_target: bool,
    pub target_blocks_actor: bool,
    /// Edge direction: target is the restrictor, actor the restricted.
    pub target_restricts_actor: bool,
    /// The actor's own mute of the target, if any.
    pub mute: Option<MuteFlags>,
    pub target_presence: Option<PresenceRecord>,
}

impl PairSnapshot {
    fn blocked_either_way(&self) -> bool {
        self.actor_blocks_target || self.target_blocks_actor
    }
}

/// Evaluate one interaction against a snapshot.
///
/// Precedence is fixed: ban, then block, then restriction, then the
/// default. Block outranks restriction because it is the strongest explicit
/// signal of non-consent; restriction outranks mute because it changes how
/// content is shown, not merely whether it is aggregated. Mutes never deny
/// anything here — they only drive [`feed_excluded`] for aggregated feeds.
pub fn evaluate(interaction: Interaction, snapshot: &PairSnapshot) -> Decision {
    // 1. Ban check: a suspended actor may do nothing; a suspended target's
    //    content is hidden from everyone but administrators.
    if snapshot.actor_suspended {
        return Decision::Denied {
            reason: DenialReason::Suspended,
        };
    }
    if snapshot.target_suspended && !snapshot.actor_is_admin {
        return Decision::Denied {
            reason: DenialReason::Suspended,
        };
    }

    // 2. Mutual block check: an edge in either direction hides the pair
    //    from each other on every surface, and the identical outcome on
    //    both sides keeps the edge's direction unknowable.
    if snapshot.blocked_either_way() {
        return Decision::Denied {
            reason: DenialReason::Blocked,
        };
    }

    // 3. Restriction: commenting and messaging stay allowed but the output
    //    queues for the restrictor's approval. Invisible to the actor.
    if snapshot.target_restricts_actor
        && matches!(interaction, Interaction::Comment | Interaction::SendMessage)
    {
        return Decision::AllowedWithSuppression {
            what: Suppression::Restricted,
        };
    }

    // 4. Mutes are intentionally not consulted: direct navigation stays
    //    allowed, only aggregated feeds drop the target's items.

    // 5. Presence annotation, DM header surface only.
    let presence = match interaction {
        Interaction::SendMessage => snapshot.target_presence.as_ref().map(|p| PresenceInfo {
            is_online: p.is_online,
            last_seen: p.last_seen,
        }),
        _ => None,
    };

    Decision::Allowed { presence }
}

/// Whether a target's items are excluded from one of the actor's
/// aggregated feeds, given the actor's mute flags for that target.
pub fn feed_excluded(mute: MuteFlags, surface: Surface) -> bool {
    match surface {
        Surface::PostFeed => mute.mute_posts,
        Surface::StoryFeed => mute.mute_stories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserId;
    use chrono::Utc;

    fn presence(is_online: bool) -> PresenceRecord {
        PresenceRecord {
            user: UserId::new("t"),
            is_online,
            last_seen: Utc::now().naive_utc(),
            seq: 1,
        }
    }

    #[test]
    fn empty_snapshot_allows_everything() {
        let snapshot = PairSnapshot::default();
        for interaction in Interaction::ALL {
            assert!(evaluate(interaction, &snapshot).is_allowed());
        }
    }

    #[test]
    fn block_denies_symmetrically_in_both_directions() {
        // Outgoing and incoming edges must be indistinguishable in outcome
        let outgoing = PairSnapshot {
            actor_blocks_target: true,
            ..Default::default()
        };
        let incoming = PairSnapshot {
            target_blocks_actor: true,
            ..Default::default()
        };
        for interaction in Interaction::ALL {
            let a = evaluate(interaction, &outgoing);
            let b = evaluate(interaction, &incoming);
            assert_eq!(
                a,
                Decision::Denied {
                    reason: DenialReason::Blocked
                }
            );
            assert_eq!(a, b);
        }
    }

    #[test]
    fn suspension_outranks_block() {
        let snapshot = PairSnapshot {
            actor_suspended: true,
            actor_blocks_target: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate(Interaction::SendMessage, &snapshot),
            Decision::Denied {
                reason: DenialReason::Suspended
            }
        );
    }

    #[test]
    fn suspended_target_hidden_except_from_admin() {
        let snapshot = PairSnapshot {
            target_suspended: true,
            ..Default::default()
        };
        assert!(evaluate(Interaction::ViewProfile, &snapshot).is_denied());

        let admin = PairSnapshot {
            target_suspended: true,
            actor_is_admin: true,
            ..Default::default()
        };
        assert!(evaluate(Interaction::ViewProfile, &admin).is_allowed());
    }

    #[test]
    fn block_outranks_restriction() {
        let snapshot = PairSnapshot {
            target_blocks_actor: true,
            target_restricts_actor: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate(Interaction::Comment, &snapshot),
            Decision::Denied {
                reason: DenialReason::Blocked
            }
        );
    }

    #[test]
    fn restriction_suppresses_comment_and_message_only() {
        let snapshot = PairSnapshot {
            target_restricts_actor: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate(Interaction::Comment, &snapshot),
            Decision::AllowedWithSuppression {
                what: Suppression::Restricted
            }
        );
        assert_eq!(
            evaluate(Interaction::SendMessage, &snapshot),
            Decision::AllowedWithSuppression {
                what: Suppression::Restricted
            }
        );
        // Viewing surfaces are untouched; the restricted party must see
        // nothing unusual anywhere
        assert!(evaluate(Interaction::ViewProfile, &snapshot).is_allowed());
        assert!(evaluate(Interaction::ViewStory, &snapshot).is_allowed());
        assert!(evaluate(Interaction::SearchAppear, &snapshot).is_allowed());
    }

    #[test]
    fn mute_never_changes_the_decision() {
        let muted = PairSnapshot {
            mute: Some(MuteFlags::all()),
            ..Default::default()
        };
        let unmuted = PairSnapshot::default();
        for interaction in Interaction::ALL {
            assert_eq!(evaluate(interaction, &muted), evaluate(interaction, &unmuted));
        }
    }

    #[test]
    fn mute_flags_drive_feed_exclusion_independently() {
        let stories_only = MuteFlags::stories();
        assert!(feed_excluded(stories_only, Surface::StoryFeed));
        assert!(!feed_excluded(stories_only, Surface::PostFeed));

        let posts_only = MuteFlags::posts();
        assert!(!feed_excluded(posts_only, Surface::StoryFeed));
        assert!(feed_excluded(posts_only, Surface::PostFeed));
    }

    #[test]
    fn presence_attached_to_dm_surface_only() {
        let snapshot = PairSnapshot {
            target_presence: Some(presence(true)),
            ..Default::default()
        };
        match evaluate(Interaction::SendMessage, &snapshot) {
            Decision::Allowed { presence } => {
                assert!(presence.expect("presence annotation").is_online)
            }
            other => panic!("unexpected decision: {:?}", other),
        }
        assert_eq!(
            evaluate(Interaction::ViewProfile, &snapshot),
            Decision::Allowed { presence: None }
        );
    }

    #[test]
    fn presence_never_attached_for_blocked_target() {
        let snapshot = PairSnapshot {
            actor_blocks_target: true,
            target_presence: Some(presence(true)),
            ..Default::default()
        };
        assert!(evaluate(Interaction::SendMessage, &snapshot).is_denied());
    }
}
