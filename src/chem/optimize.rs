//! Force-field geometry refinement of an embedded conformer.
//!
//! Harmonic bond and angle terms plus a Lennard-Jones term for non-bonded
//! pairs (1-2 and 1-3 excluded), minimized by steepest descent with a
//! central-difference numeric gradient. Crude next to MMFF, but enough to
//! relax distance-geometry output into chemically sensible shapes.

use crate::chem::embed::Coordinates;
use crate::chem::molecule::{BondOrder, Molecule};
use crate::error::PipelineError;

const BOND_FORCE: f64 = 300.0;
const ANGLE_FORCE: f64 = 60.0;
const LJ_EPSILON: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct OptimizeConfig {
    pub max_steps: usize,
    pub gradient_threshold: f64,
    pub step_size: f64,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            gradient_threshold: 0.5,
            step_size: 1.0e-3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub coordinates: Coordinates,
    pub energy: f64,
    pub steps: usize,
    pub converged: bool,
}

pub fn optimize_geometry(
    mol: &Molecule,
    coordinates: &Coordinates,
    config: &OptimizeConfig,
) -> Result<OptimizeResult, PipelineError> {
    if coordinates.len() != mol.atom_count() {
        return Err(PipelineError::Chem(format!(
            "coordinate count {} does not match atom count {}",
            coordinates.len(),
            mol.atom_count()
        )));
    }

    let terms = ForceTerms::build(mol);
    let mut coords = coordinates.clone();
    let mut energy = terms.energy(&coords);
    if !energy.is_finite() {
        return Err(PipelineError::Chem(
            "initial geometry has non-finite energy".to_string(),
        ));
    }

    let mut converged = false;
    let mut steps = 0usize;
    for step in 0..config.max_steps {
        steps = step + 1;
        let gradient = terms.numeric_gradient(&coords);
        let norm = gradient
            .iter()
            .flat_map(|g| g.iter())
            .map(|value| value * value)
            .sum::<f64>()
            .sqrt();
        if !norm.is_finite() {
            return Err(PipelineError::Chem(
                "geometry optimization diverged".to_string(),
            ));
        }
        if norm < config.gradient_threshold {
            converged = true;
            break;
        }

        // Backtracking on the fixed step until the energy stops rising.
        let mut alpha = config.step_size;
        loop {
            let trial = displaced(&coords, &gradient, -alpha);
            let trial_energy = terms.energy(&trial);
            if trial_energy < energy {
                coords = trial;
                energy = trial_energy;
                break;
            }
            alpha *= 0.5;
            if alpha < 1.0e-8 {
                converged = true;
                break;
            }
        }
        if converged {
            break;
        }
    }

    if !energy.is_finite() {
        return Err(PipelineError::Chem(
            "geometry optimization diverged".to_string(),
        ));
    }
    Ok(OptimizeResult {
        coordinates: coords,
        energy,
        steps,
        converged,
    })
}

struct BondTerm {
    i: usize,
    j: usize,
    ideal: f64,
}

struct AngleTerm {
    i: usize,
    center: usize,
    j: usize,
    ideal: f64,
}

struct NonBondedTerm {
    i: usize,
    j: usize,
    sigma: f64,
}

struct ForceTerms {
    bonds: Vec<BondTerm>,
    angles: Vec<AngleTerm>,
    non_bonded: Vec<NonBondedTerm>,
}

impl ForceTerms {
    fn build(mol: &Molecule) -> Self {
        let n = mol.atom_count();

        let bonds = mol
            .bonds
            .iter()
            .map(|bond| BondTerm {
                i: bond.atom1,
                j: bond.atom2,
                ideal: ideal_length(mol, bond.atom1, bond.atom2, bond.order),
            })
            .collect::<Vec<_>>();

        let mut angles = Vec::new();
        for center in 0..n {
            let neighbors = &mol.adjacency[center];
            for a in 0..neighbors.len() {
                for b in (a + 1)..neighbors.len() {
                    angles.push(AngleTerm {
                        i: neighbors[a].0,
                        center,
                        j: neighbors[b].0,
                        ideal: ideal_angle(mol, center),
                    });
                }
            }
        }

        // 1-2 and 1-3 pairs are handled by the bonded terms.
        let mut excluded = vec![false; n * n];
        for bond in &mol.bonds {
            excluded[bond.atom1 * n + bond.atom2] = true;
            excluded[bond.atom2 * n + bond.atom1] = true;
        }
        for angle in &angles {
            excluded[angle.i * n + angle.j] = true;
            excluded[angle.j * n + angle.i] = true;
        }
        let mut non_bonded = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if excluded[i * n + j] {
                    continue;
                }
                let sigma = (vdw(mol.atoms[i].atomic_number) + vdw(mol.atoms[j].atomic_number))
                    / 2.0
                    * 0.9;
                non_bonded.push(NonBondedTerm { i, j, sigma });
            }
        }

        Self {
            bonds,
            angles,
            non_bonded,
        }
    }

    fn energy(&self, coords: &Coordinates) -> f64 {
        let mut energy = 0.0;
        for term in &self.bonds {
            let d = distance(coords[term.i], coords[term.j]);
            let delta = d - term.ideal;
            energy += BOND_FORCE * delta * delta;
        }
        for term in &self.angles {
            let theta = angle(coords[term.i], coords[term.center], coords[term.j]);
            let delta = theta - term.ideal;
            energy += ANGLE_FORCE * delta * delta;
        }
        for term in &self.non_bonded {
            let d = distance(coords[term.i], coords[term.j]).max(0.1);
            let ratio = term.sigma / d;
            let sixth = ratio.powi(6);
            energy += 4.0 * LJ_EPSILON * (sixth * sixth - sixth);
        }
        energy
    }

    fn numeric_gradient(&self, coords: &Coordinates) -> Vec<[f64; 3]> {
        const H: f64 = 1.0e-4;
        let mut gradient = vec![[0.0f64; 3]; coords.len()];
        let mut probe = coords.clone();
        for i in 0..coords.len() {
            for axis in 0..3 {
                let original = probe[i][axis];
                probe[i][axis] = original + H;
                let plus = self.energy(&probe);
                probe[i][axis] = original - H;
                let minus = self.energy(&probe);
                probe[i][axis] = original;
                gradient[i][axis] = (plus - minus) / (2.0 * H);
            }
        }
        gradient
    }
}

fn ideal_length(mol: &Molecule, atom1: usize, atom2: usize, order: BondOrder) -> f64 {
    let base = covalent(mol.atoms[atom1].atomic_number) + covalent(mol.atoms[atom2].atomic_number);
    match order {
        BondOrder::Single => base,
        BondOrder::Double => base * 0.87,
        BondOrder::Triple => base * 0.78,
        BondOrder::Aromatic => base * 0.91,
    }
}

/// Ideal angle at the central atom from its bonding pattern: linear for
/// sp centers, trigonal for sp2/aromatic, tetrahedral otherwise.
fn ideal_angle(mol: &Molecule, center: usize) -> f64 {
    let has_triple = mol.adjacency[center]
        .iter()
        .any(|&(_, bond)| mol.bonds[bond].order == BondOrder::Triple);
    let has_double = mol.adjacency[center]
        .iter()
        .any(|&(_, bond)| {
            matches!(
                mol.bonds[bond].order,
                BondOrder::Double | BondOrder::Aromatic
            )
        });
    if has_triple || (mol.degree(center) == 2 && has_double) {
        std::f64::consts::PI
    } else if has_double || mol.atoms[center].is_aromatic {
        120.0f64.to_radians()
    } else {
        109.47f64.to_radians()
    }
}

fn covalent(atomic_number: u8) -> f64 {
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

fn vdw(atomic_number: u8) -> f64 {
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

fn displaced(coords: &Coordinates, gradient: &[[f64; 3]], alpha: f64) -> Coordinates {
    coords
        .iter()
        .zip(gradient.iter())
        .map(|(point, grad)| {
            [
                point[0] + alpha * grad[0],
                point[1] + alpha * grad[1],
                point[2] + alpha * grad[2],
            ]
        })
        .collect()
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn angle(a: [f64; 3], center: [f64; 3], b: [f64; 3]) -> f64 {
    let u = [a[0] - center[0], a[1] - center[1], a[2] - center[2]];
    let v = [b[0] - center[0], b[1] - center[1], b[2] - center[2]];
    let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
    let norm_u = (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
    let norm_v = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm_u < 1.0e-12 || norm_v < 1.0e-12 {
        return 0.0;
    }
    (dot / (norm_u * norm_v)).clamp(-1.0, 1.0).acos()
}
