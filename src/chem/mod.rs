pub mod embed;
pub mod molecule;
pub mod optimize;
pub mod pdbfile;
pub mod smiles;
