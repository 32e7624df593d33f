use anyhow::Result;
use itertools::Itertools;
use ndarray::Array1;
use wham_rs::testsystems::*;
use wham_rs::*;

fn main() -> Result<()> {
    env_logger::init();

    // Generate some sample data: eight windows along a flat coordinate
    let centers: Vec<f64> = (0..8).map(|i| 0.5 * i as f64).collect();
    let testcase = HarmonicWindows::builder()
        .centers(centers.clone())
        .weights(vec![10.0])
        .std(0.25)
        .samples_per_window(4000)
        .build()?;
    let sims = testcase.sample()?;

    println!(
        "Overlap between neighbours: {:?}",
        sims.pairwise_overlap().map(|o| o.to_vec())
    );

    // Treat four blocks of every window as independent runs on shared bins
    let mut runs = sims.blocks(4)?;
    for run in runs.iter_mut() {
        run.make_histograms(40_usize, Some((-0.5, 4.0)), true)?;
    }

    let wham = Wham::builder().tolerance(1.0e-6).build()?;
    let ensemble = PmfEnsemble::make(&runs, &wham, true)?;

    println!("# z PMF Uncert. ({})", ensemble.unit().label());
    for ((z, av), std) in ensemble
        .z()
        .iter()
        .zip(ensemble.av().iter())
        .zip(ensemble.std().iter())
        .step_by(4)
    {
        println!("{:6.3} {:8.4} {:8.4}", z, av, std);
    }

    println!("Transfer free energy: {}", ensemble.transfer_dg());
    println!("Water-lipid barrier: {}", ensemble.waterlipid_barrier());
    println!("Penetration barrier: {}", ensemble.penetration_barrier());
    println!("Standard binding free energy: {}", ensemble.standard_dg()?);

    // Spacing of the window centers, for comparison with the histogram grid
    let spacing: Array1<f64> = centers
        .iter()
        .tuple_windows()
        .map(|(left, right)| right - left)
        .collect();
    println!("Window spacing: {}", spacing);

    // Position-dependent diffusion from the fluctuations within each window
    match Diffusion::default().pmf(&sims) {
        Ok(diffusion) => {
            println!("# z D");
            for (z, d) in diffusion.z.iter().zip(diffusion.free.iter()) {
                println!("{:6.3} {:10.4}", z, d);
            }
        }
        // Uncorrelated synthetic samples leave little autocorrelation to fit
        Err(e) => println!("No diffusion profile: {}", e),
    }

    Ok(())
}
