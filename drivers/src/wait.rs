/*++

Licensed under the Apache-2.0 license.

File Name:

    wait.rs

Abstract:

    File contains common functions to implement wait routines.

--*/

/// Spin until `predicate` holds or `max_polls` evaluations have failed.
///
/// Returns `true` if the predicate was satisfied.
pub fn until_or_ceiling<F>(max_polls: u32, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..max_polls {
        if predicate() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_or_ceiling() {
        let mut polls = 0;
        assert!(until_or_ceiling(10, || {
            polls += 1;
            polls == 3
        }));
        assert_eq!(polls, 3);

        let mut polls = 0;
        assert!(!until_or_ceiling(5, || {
            polls += 1;
            false
        }));
        assert_eq!(polls, 5);
    }
}
