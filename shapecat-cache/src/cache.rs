use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref TEXT_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a screen string and return its stable id
pub fn intern_text(s: &str) -> usize {
    let atom = Atom::from(s);
    if let Some(idx) = TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .position(|a| *a == atom)
    {
        return idx;
    }
    let mut v = TEXT_INTERNER.write().unwrap_or_else(PoisonError::into_inner);
    // Another writer may have won the race between the two locks
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

/// Current count of unique texts
pub fn text_count() -> usize {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

pub fn get_text(id: usize) -> Option<Atom> {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let a = intern_text("Volume: 35%");
        let b = intern_text("Volume: 35%");
        assert_eq!(a, b);
        assert_eq!(get_text(a).as_deref(), Some("Volume: 35%"));
    }

    #[test]
    fn test_distinct_texts_get_distinct_ids() {
        let a = intern_text("Correct!");
        let b = intern_text("Incorrect!");
        assert_ne!(a, b);
        assert!(text_count() >= 2);
    }

    #[test]
    fn test_unknown_id() {
        assert!(get_text(usize::MAX).is_none());
    }
}
