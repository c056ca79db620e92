/*! Parser for crystallographic symmetry operator strings.

A record is a comma-separated triple of expressions over x, y, z and
rational translations, e.g. `-X+1/2, Y, Z+1/4`. Each expression becomes
one row of an affine 4x4 matrix over fractional coordinates: axis terms
set +-1 in the linear columns, numeric terms accumulate into the
translation column. Case and whitespace are insignificant. */

use thiserror::Error;

use super::SymOp;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymOpError {
  #[error("expected three comma-separated expressions, got {0}")]
  WrongExpressionCount(usize),
  #[error("unrecognized term {0:?} in symmetry expression")]
  UnrecognizedTerm(String),
  #[error("zero denominator in translation term {0:?}")]
  ZeroDenominator(String),
}

/// Parse one operator string into its affine matrix.
pub fn parse_operator(record: &str) -> Result<SymOp, SymOpError> {
  let expressions: Vec<&str> = record.split(',').collect();
  if expressions.len() != 3 {
    return Err(SymOpError::WrongExpressionCount(expressions.len()));
  }

  let mut matrix = [[0.0f32; 4]; 4];
  matrix[3][3] = 1.0;
  for (row, expression) in expressions.iter().enumerate() {
    parse_expression(expression, &mut matrix[row])?;
  }
  Ok(matrix)
}

/// Parse one expression (one matrix row) by splitting it into signed
/// terms at `+`/`-` boundaries.
fn parse_expression(expression: &str, row: &mut [f32; 4]) -> Result<(), SymOpError> {
  let cleaned: String = expression
    .chars()
    .filter(|c| !c.is_whitespace())
    .flat_map(char::to_lowercase)
    .collect();

  let mut term = String::new();
  let mut sign = 1.0f32;
  let mut terms: Vec<(f32, String)> = Vec::new();
  for c in cleaned.chars() {
    match c {
      '+' | '-' => {
        if !term.is_empty() {
          terms.push((sign, std::mem::take(&mut term)));
        } else if sign < 0.0 || c == '+' && !terms.is_empty() {
          // Consecutive signs ("--x") or a dangling separator.
          return Err(SymOpError::UnrecognizedTerm(cleaned.clone()));
        }
        sign = if c == '-' { -1.0 } else { 1.0 };
      }
      _ => term.push(c),
    }
  }
  if term.is_empty() {
    return Err(SymOpError::UnrecognizedTerm(cleaned));
  }
  terms.push((sign, term));

  for (sign, body) in terms {
    apply_term(sign, &body, row)?;
  }
  Ok(())
}

fn apply_term(sign: f32, body: &str, row: &mut [f32; 4]) -> Result<(), SymOpError> {
  match body {
    "x" => row[0] = sign,
    "y" => row[1] = sign,
    "z" => row[2] = sign,
    _ => row[3] += sign * parse_fraction(body)?,
  }
  Ok(())
}

/// `p` or `p/q` with decimal digits only.
fn parse_fraction(body: &str) -> Result<f32, SymOpError> {
  let parse_int = |digits: &str| -> Result<f32, SymOpError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      Err(SymOpError::UnrecognizedTerm(body.to_string()))
    } else {
      Ok(digits.parse::<u32>().map_err(|_| SymOpError::UnrecognizedTerm(body.to_string()))? as f32)
    }
  };
  match body.split_once('/') {
    None => parse_int(body),
    Some((p, q)) => {
      let p = parse_int(p)?;
      let q = parse_int(q)?;
      if q == 0.0 {
        return Err(SymOpError::ZeroDenominator(body.to_string()));
      }
      Ok(p / q)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identity_operator() {
    let m = parse_operator("X, Y, Z").unwrap();
    assert_eq!(m[0], [1.0, 0.0, 0.0, 0.0]);
    assert_eq!(m[1], [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(m[2], [0.0, 0.0, 1.0, 0.0]);
    assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
  }

  #[test]
  fn mixed_signs_and_translations() {
    let m = parse_operator("-x+1/2, y, z+1/4").unwrap();
    assert_eq!(m[0], [-1.0, 0.0, 0.0, 0.5]);
    assert_eq!(m[1], [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(m[2], [0.0, 0.0, 1.0, 0.25]);
    assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
  }

  #[test]
  fn translation_may_precede_the_axis() {
    let m = parse_operator("1/2-x, -y, 3/4+z").unwrap();
    assert_eq!(m[0], [-1.0, 0.0, 0.0, 0.5]);
    assert_eq!(m[1], [0.0, -1.0, 0.0, 0.0]);
    assert_eq!(m[2], [0.0, 0.0, 1.0, 0.75]);
  }

  #[test]
  fn whitespace_and_case_are_ignored() {
    let a = parse_operator("-X + 1/2,  Y , Z+1/4").unwrap();
    let b = parse_operator("-x+1/2,y,z+1/4").unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn axis_swapping_operators() {
    let m = parse_operator("y, x, -z").unwrap();
    assert_eq!(m[0], [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(m[1], [1.0, 0.0, 0.0, 0.0]);
    assert_eq!(m[2], [0.0, 0.0, -1.0, 0.0]);
  }

  #[test]
  fn wrong_arity_is_rejected() {
    assert_eq!(
      parse_operator("x, y"),
      Err(SymOpError::WrongExpressionCount(2))
    );
    assert_eq!(
      parse_operator("x, y, z, x"),
      Err(SymOpError::WrongExpressionCount(4))
    );
  }

  #[test]
  fn garbage_terms_are_rejected() {
    assert!(matches!(
      parse_operator("x, y, w"),
      Err(SymOpError::UnrecognizedTerm(_))
    ));
    assert!(matches!(
      parse_operator("2x, y, z"),
      Err(SymOpError::UnrecognizedTerm(_))
    ));
    assert!(matches!(
      parse_operator("x, y, "),
      Err(SymOpError::UnrecognizedTerm(_))
    ));
  }

  #[test]
  fn zero_denominator_is_rejected() {
    assert_eq!(
      parse_operator("x+1/0, y, z"),
      Err(SymOpError::ZeroDenominator("1/0".to_string()))
    );
  }

  /// Operators from a known valid set keep exactly one +-1 per row in
  /// the linear part and integer-fraction displacements.
  #[test]
  fn known_set_has_unit_linear_rows() {
    let known = [
      "x,y,z",
      "-x,-y,z",
      "-x,y+1/2,-z",
      "x+1/2,-y+1/2,-z",
      "z,x,y",
      "-y,x-y,z+1/3",
    ];
    for record in known {
      let m = parse_operator(record).unwrap_or_else(|e| panic!("{}: {}", record, e));
      for row in &m[..3] {
        let units = row[..3].iter().filter(|v| v.abs() == 1.0).count();
        assert!(units >= 1, "row without axis term in {:?}", record);
      }
    }
  }
}
