//! 3D conformer generation via distance geometry.
//!
//! Builds a distance bounds matrix from covalent radii, smooths it with
//! the triangle inequality, samples a distance matrix with a seeded RNG,
//! and recovers coordinates from the metric matrix by power iteration.
//! The fixed default seed keeps embedding deterministic run to run.

use crate::chem::molecule::{BondOrder, Molecule};
use crate::error::PipelineError;

pub const DEFAULT_SEED: u64 = 42;

pub type Coordinates = Vec<[f64; 3]>;

fn covalent_radius(atomic_number: u8) -> f64 {
    match atomic_number {
        1 => 0.31,
        5 => 0.84,
        6 => 0.76,
        7 => 0.71,
        8 => 0.66,
        9 => 0.57,
        14 => 1.11,
        15 => 1.07,
        16 => 1.05,
        17 => 1.02,
        34 => 1.20,
        35 => 1.20,
        53 => 1.39,
        _ => 0.77,
    }
}

fn vdw_radius(atomic_number: u8) -> f64 {
    match atomic_number {
        1 => 1.20,
        6 => 1.70,
        7 => 1.55,
        8 => 1.52,
        9 => 1.47,
        15 => 1.80,
        16 => 1.80,
        17 => 1.75,
        35 => 1.85,
        53 => 1.98,
        _ => 1.70,
    }
}

fn ideal_bond_length(mol: &Molecule, bond_index: usize) -> f64 {
    let bond = &mol.bonds[bond_index];
    let base = covalent_radius(mol.atoms[bond.atom1].atomic_number)
        + covalent_radius(mol.atoms[bond.atom2].atomic_number);
    match bond.order {
        BondOrder::Single => base,
        BondOrder::Double => base * 0.87,
        BondOrder::Triple => base * 0.78,
        BondOrder::Aromatic => base * 0.91,
    }
}

/// Embed one conformer for `mol` with the given seed.
pub fn embed_molecule(mol: &Molecule, seed: u64) -> Result<Coordinates, PipelineError> {
    let n = mol.atom_count();
    if n == 0 {
        return Err(PipelineError::Chem("cannot embed an empty molecule".to_string()));
    }
    if n == 1 {
        return Ok(vec![[0.0, 0.0, 0.0]]);
    }

    let (lower, upper) = build_bounds(mol);
    let (lower, upper) = smooth_bounds(lower, upper, n)?;

    let mut rng = SimpleRng::new(seed);
    let mut distances = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let sample = lower[i][j] + rng.next_f64() * (upper[i][j] - lower[i][j]);
            distances[i][j] = sample;
            distances[j][i] = sample;
        }
    }

    coords_from_distances(&distances, n, &mut rng)
}

/// Bounds: tight around the ideal length for bonded pairs, law-of-cosines
/// for 1-3 pairs, van der Waals floor and bond-path ceiling otherwise.
fn build_bounds(mol: &Molecule) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let n = mol.atom_count();
    const FAR: f64 = 1.0e3;
    let mut lower = vec![vec![0.0f64; n]; n];
    let mut upper = vec![vec![FAR; n]; n];

    for i in 0..n {
        for j in 0..n {
            if i != j {
                let floor = 0.8 * (vdw_radius(mol.atoms[i].atomic_number)
                    + vdw_radius(mol.atoms[j].atomic_number))
                    / 2.0;
                lower[i][j] = floor;
            }
        }
        lower[i][i] = 0.0;
        upper[i][i] = 0.0;
    }

    for (bond_index, bond) in mol.bonds.iter().enumerate() {
        let length = ideal_bond_length(mol, bond_index);
        lower[bond.atom1][bond.atom2] = length - 0.01;
        lower[bond.atom2][bond.atom1] = length - 0.01;
        upper[bond.atom1][bond.atom2] = length + 0.01;
        upper[bond.atom2][bond.atom1] = length + 0.01;
    }

    // 1-3 distances from a tetrahedral-ish angle at the central atom
    let angle = 109.47f64.to_radians();
    for center in 0..n {
        let neighbors = &mol.adjacency[center];
        for a in 0..neighbors.len() {
            for b in (a + 1)..neighbors.len() {
                let (i, bond_i) = neighbors[a];
                let (j, bond_j) = neighbors[b];
                if mol.adjacency[i].iter().any(|&(other, _)| other == j) {
                    continue; // three-membered ring, bond bound wins
                }
                let d_i = ideal_bond_length(mol, bond_i);
                let d_j = ideal_bond_length(mol, bond_j);
                let d13 = (d_i * d_i + d_j * d_j - 2.0 * d_i * d_j * angle.cos()).sqrt();
                lower[i][j] = lower[i][j].max(d13 - 0.05);
                lower[j][i] = lower[i][j];
                upper[i][j] = upper[i][j].min(d13 + 0.05);
                upper[j][i] = upper[i][j];
            }
        }
    }

    (lower, upper)
}

/// Triangle-inequality smoothing (Floyd-Warshall over the upper bounds,
/// with the lower bounds raised to stay consistent).
fn smooth_bounds(
    mut lower: Vec<Vec<f64>>,
    mut upper: Vec<Vec<f64>>,
    n: usize,
) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), PipelineError> {
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                let via = upper[i][k] + upper[k][j];
                if upper[i][j] > via {
                    upper[i][j] = via;
                }
                let floor = lower[i][k] - upper[k][j];
                if lower[i][j] < floor {
                    lower[i][j] = floor;
                }
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            if lower[i][j] > upper[i][j] + 1.0e-6 {
                return Err(PipelineError::Chem(format!(
                    "inconsistent distance bounds between atoms {i} and {j}"
                )));
            }
        }
    }
    Ok((lower, upper))
}

/// Classical multidimensional scaling: center the squared distances into a
/// metric matrix and take its three dominant eigenvectors.
fn coords_from_distances(
    distances: &[Vec<f64>],
    n: usize,
    rng: &mut SimpleRng,
) -> Result<Coordinates, PipelineError> {
    let mut squared_to_center = vec![0.0f64; n];
    let mut total = 0.0f64;
    for i in 0..n {
        for j in 0..n {
            let d2 = distances[i][j] * distances[i][j];
            squared_to_center[i] += d2;
            total += d2;
        }
    }
    for value in &mut squared_to_center {
        *value /= n as f64;
    }
    total /= (n * n) as f64;

    let mut metric = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            let d2 = distances[i][j] * distances[i][j];
            metric[i][j] = 0.5 * (squared_to_center[i] + squared_to_center[j] - total - d2);
        }
    }

    let mut coords = vec![[0.0f64; 3]; n];
    for axis in 0..3 {
        let (eigenvalue, vector) = power_iteration(&metric, n, rng)?;
        if eigenvalue <= 0.0 {
            // Remaining axes are degenerate; leave them at zero.
            break;
        }
        let scale = eigenvalue.sqrt();
        for i in 0..n {
            coords[i][axis] = vector[i] * scale;
        }
        // Deflate so the next iteration finds the next eigenpair.
        for i in 0..n {
            for j in 0..n {
                metric[i][j] -= eigenvalue * vector[i] * vector[j];
            }
        }
    }

    if coords
        .iter()
        .any(|point| point.iter().any(|value| !value.is_finite()))
    {
        return Err(PipelineError::Chem(
            "embedding produced non-finite coordinates".to_string(),
        ));
    }
    Ok(coords)
}

fn power_iteration(
    matrix: &[Vec<f64>],
    n: usize,
    rng: &mut SimpleRng,
) -> Result<(f64, Vec<f64>), PipelineError> {
    let mut vector = (0..n).map(|_| rng.next_f64() - 0.5).collect::<Vec<_>>();
    normalize(&mut vector);

    let mut eigenvalue = 0.0;
    for _ in 0..200 {
        let mut next = vec![0.0f64; n];
        for i in 0..n {
            for j in 0..n {
                next[i] += matrix[i][j] * vector[j];
            }
        }
        let norm = next.iter().map(|value| value * value).sum::<f64>().sqrt();
        if norm < 1.0e-12 {
            return Ok((0.0, vector));
        }
        for value in &mut next {
            *value /= norm;
        }
        eigenvalue = norm;
        vector = next;
    }
    if !eigenvalue.is_finite() {
        return Err(PipelineError::Chem(
            "power iteration diverged during embedding".to_string(),
        ));
    }
    Ok((eigenvalue, vector))
}

fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|value| value * value).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// xorshift64*, enough randomness for bound sampling and fully
/// reproducible for a fixed seed.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use crate::chem::smiles::parse_smiles;

    use super::*;

    fn embed(smiles: &str) -> Coordinates {
        let mol = parse_smiles(&smiles.parse().unwrap(), "test")
            .unwrap()
            .with_explicit_hydrogens();
        embed_molecule(&mol, DEFAULT_SEED).unwrap()
    }

    fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
    }

    #[test]
    fn ethane_bond_length_is_plausible() {
        let coords = embed("CC");
        assert_eq!(coords.len(), 8);
        let cc = distance(coords[0], coords[1]);
        assert!(cc > 1.0 && cc < 2.2, "C-C distance {cc}");
    }

    #[test]
    fn embedding_is_deterministic_for_fixed_seed() {
        let first = embed("C(F)(F)(F)C(=O)O");
        let second = embed("C(F)(F)(F)C(=O)O");
        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_differ() {
        let mol = parse_smiles(&"CCO".parse().unwrap(), "test")
            .unwrap()
            .with_explicit_hydrogens();
        let a = embed_molecule(&mol, 42).unwrap();
        let b = embed_molecule(&mol, 43).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn single_atom_sits_at_origin() {
        let mol = parse_smiles(&"O".parse().unwrap(), "water").unwrap();
        let coords = embed_molecule(&mol, DEFAULT_SEED).unwrap();
        assert_eq!(coords, vec![[0.0, 0.0, 0.0]]);
    }
}
