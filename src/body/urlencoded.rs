//! `application/x-www-form-urlencoded` parsing, also used for query strings.

use crate::transformations::url_decode;
use crate::variables::Collection;

/// Split `input` on `separator` into decoded name/value pairs.
///
/// A pair without `=` becomes a name with an empty value.
pub fn parse_pairs(input: &str, separator: char) -> Collection {
    let mut args = Collection::new();
    for pair in input.split(separator) {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        args.add(url_decode(name).into_owned(), url_decode(value).into_owned());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let args = parse_pairs("a=1&b=hello%20world&c&&d=x+y", '&');
        let pairs: Vec<_> = args.iter().collect();
        assert_eq!(
            pairs,
            vec![("a", "1"), ("b", "hello world"), ("c", ""), ("d", "x y")]
        );
    }

    #[test]
    fn test_repeated_names() {
        let args = parse_pairs("id=1;id=2", ';');
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("id"), Some("1"));
    }
}
