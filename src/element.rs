//! Owned-or-borrowed element slots.
//!
//! The owns/borrows decision is carried by the variant rather than a flag
//! next to a raw pointer: dropping an `Owned` slot frees the element,
//! dropping a `Borrowed` slot never does, and there is no third state in
//! which both the caller and the collection believe they own it.

use crate::config::Adoption;
use core::fmt;
use core::ops::Deref;

pub enum Element<'e, T> {
    Owned(Box<T>),
    Borrowed(&'e T),
}

impl<'e, T> Element<'e, T> {
    pub fn owned(value: T) -> Self {
        Element::Owned(Box::new(value))
    }

    pub fn adoption(&self) -> Adoption {
        match self {
            Element::Owned(_) => Adoption::Adopt,
            Element::Borrowed(_) => Adoption::NoAdopt,
        }
    }

    /// Address identity of the element.
    pub fn as_ptr(&self) -> *const T {
        &**self as *const T
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Element::Owned(b) => Some(&mut **b),
            Element::Borrowed(_) => None,
        }
    }

    /// Unwrap an owned element; a borrowed one is handed back unchanged.
    pub fn into_owned(self) -> Result<Box<T>, &'e T> {
        match self {
            Element::Owned(b) => Ok(b),
            Element::Borrowed(r) => Err(r),
        }
    }
}

impl<'e, T> Deref for Element<'e, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self {
            Element::Owned(b) => &**b,
            Element::Borrowed(r) => *r,
        }
    }
}

impl<'e, T> From<Box<T>> for Element<'e, T> {
    fn from(b: Box<T>) -> Self {
        Element::Owned(b)
    }
}

impl<'e, T> From<&'e T> for Element<'e, T> {
    fn from(r: &'e T) -> Self {
        Element::Borrowed(r)
    }
}

impl<'e, T: fmt::Debug> fmt::Debug for Element<'e, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Owned(b) => f.debug_tuple("Owned").field(&**b).finish(),
            Element::Borrowed(r) => f.debug_tuple("Borrowed").field(r).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_moves() {
        let e: Element<'_, String> = Element::owned("x".to_string());
        let p = e.as_ptr();
        let moved = e;
        assert_eq!(moved.as_ptr(), p);
    }

    #[test]
    fn borrowed_cannot_be_mutated() {
        let v = 3;
        let mut e = Element::from(&v);
        assert_eq!(e.adoption(), Adoption::NoAdopt);
        assert!(e.get_mut().is_none());
        assert_eq!(*e, 3);
    }
}
