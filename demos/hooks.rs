use handlex::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let x = Tensor::try_new(vec![1.0f32, 2.0, 3.0])?;
    x.try_set_requires_grad(true)?;

    // Clip the gradient reaching `x` to at most 1.
    x.try_register_hook(|g: &Tensor| -> Result<Tensor> {
        let clipped: Vec<f32> = g.try_to_flatten_vec::<f32>()?.into_iter().map(|v| v.min(1.0)).collect();
        Tensor::try_from_flatten_vec(clipped, g.sizes())
    })?;

    let y = x.try_mul(&x)?;
    y.try_retain_grad()?;
    let loss = y.try_sum()?;
    loss.try_backward(BackwardOptions::new())?;

    println!("y.grad = {:?}", y.try_grad()?.try_to_flatten_vec::<f32>()?);
    println!("x.grad = {:?}", x.try_grad()?.try_to_flatten_vec::<f32>()?);

    let level = enter_dual_level();
    let tangent = Tensor::try_ones(&[3])?;
    x.try_set_fw_grad(&tangent, level, false)?;
    let view = x.try_narrow(0, 1, 2)?;
    println!("view tangent = {:?}", view.try_fw_grad(level)?.try_to_flatten_vec::<f32>()?);
    exit_dual_level(level)?;

    Ok(())
}
