//! Formatting helpers shared by the `Display` implementations.

use std::fmt::{Display, Error, Formatter};

/// A custom type to extract the formatter and feed it to a formatting
/// closure, so that list items without a `Display` of their own can go
/// through [`disp_iter`].
/// Source: `<https://github.com/rust-lang/rust/issues/46591#issuecomment-350437057>`
pub struct Fmt<F>(pub F)
where
    F: Fn(&mut std::fmt::Formatter) -> std::fmt::Result;

impl<F> std::fmt::Display for Fmt<F>
where
    F: Fn(&mut std::fmt::Formatter) -> std::fmt::Result,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        (self.0)(f)
    }
}

/// Writes the items of `iterable` separated by `sep` (no trailing separator).
pub fn disp_iter<T: Display>(
    f: &mut Formatter<'_>,
    iterable: impl IntoIterator<Item = T>,
    sep: &str,
) -> Result<(), Error> {
    let mut items = iterable.into_iter();
    if let Some(first) = items.next() {
        write!(f, "{first}")?;
        for other in items {
            write!(f, "{sep}")?;
            write!(f, "{other}")?;
        }
    }
    Result::Ok(())
}

/// Writes the left column of an aligned `name: value` report line.
pub fn disp_field(f: &mut Formatter<'_>, name: &str, width: usize) -> Result<(), Error> {
    write!(f, "{name:<width$}: ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn separators_go_between_items_only() {
        let line = format!("{}", Fmt(|f| disp_iter(f, ["a", "b", "c"], ", ")));
        assert_eq!(line, "a, b, c");
        let line = format!("{}", Fmt(|f| disp_iter(f, std::iter::empty::<&str>(), ", ")));
        assert_eq!(line, "");
        let line = format!("{}", Fmt(|f| disp_iter(f, [7], " | ")));
        assert_eq!(line, "7");
    }

    #[test]
    fn closures_format_through_fmt() {
        let items = [(1, 2), (3, 4)];
        let line = format!(
            "{}",
            Fmt(|f| disp_iter(f, items.iter().map(|(a, b)| Fmt(move |f| write!(f, "{a}:{b}"))), "; "))
        );
        assert_eq!(line, "1:2; 3:4");
    }

    #[test]
    fn field_column_is_aligned() {
        let line = format!("{}", Fmt(|f| disp_field(f, "cycles", 10)));
        assert_eq!(line, "cycles    : ");
    }
}
