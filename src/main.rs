use wham_rs::testsystems::HarmonicWindows;
use wham_rs::*;

fn main() -> Result<()> {
    env_logger::init();

    let mut sims = HarmonicWindows::builder()
        .centers(vec![0.0, 1.0])
        .weights(vec![5.0])
        .build()?
        .sample()?;
    sims.make_histograms(20_usize, Some((-1.0, 2.0)), true)?;

    let wham = Wham::builder().build()?;
    let mut solver = wham.solver(&sims);
    let convergence = solver.iterate().map_err(|e| {
        println!("{}", e);
        e
    })?;

    println!("{:?}", convergence);
    println!("# z PMF ({})", sims.unit().label());
    for (z, free) in solver.z().iter().zip(solver.free().iter()) {
        println!("{:8.3} {:10.4}", z, free);
    }

    Ok(())
}
