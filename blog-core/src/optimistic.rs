use crate::entity_store::Likeable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    pub fn endpoint(self) -> &'static str {
        match self {
            LikeAction::Like => "like",
            LikeAction::Unlike => "unlike",
        }
    }

    /// Applies the local effect immediately and returns what changed.
    pub fn apply<L: Likeable>(self, item: &mut L) -> LikeEffect {
        let (was_liked, likes) = item.like_state();
        let (liked, next) = match self {
            LikeAction::Like => (true, likes.saturating_add(1)),
            LikeAction::Unlike => (false, likes.saturating_sub(1)),
        };
        item.set_like_state(liked, next);
        LikeEffect {
            was_liked,
            step: match next.cmp(&likes) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
            },
        }
    }
}

/// Record of an optimistic toggle. Reverting undoes the counter step that was
/// actually taken, so a clamped unlike at zero does not add a phantom like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeEffect {
    was_liked: bool,
    step: i8,
}

impl LikeEffect {
    pub fn revert<L: Likeable>(self, item: &mut L) {
        let (_, likes) = item.like_state();
        let restored = match self.step {
            1 => likes.saturating_sub(1),
            -1 => likes.saturating_add(1),
            _ => likes,
        };
        item.set_like_state(self.was_liked, restored);
    }
}
