//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for the DeleteBackupRequest,
//! Backup and Restore resources used by the deletion controller.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use ark_backup_deletion_controller::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
