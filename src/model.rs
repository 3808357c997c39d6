use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

const POOL_SIZE: usize = 8;
const CONV_CHANNELS: [usize; 3] = [1, 8, 16];

/// Topology of the digit classifier. Weights come from a separately fetched record.
#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 512)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
}

impl ModelConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let [input, hidden, output] = CONV_CHANNELS;

        Model {
            conv1: Conv2dConfig::new([input, hidden], [3, 3]).init(device),
            conv2: Conv2dConfig::new([hidden, output], [3, 3]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([POOL_SIZE, POOL_SIZE]).init(),
            activation: Relu::new(),
            linear1: LinearConfig::new(output * POOL_SIZE * POOL_SIZE, self.hidden_size)
                .init(device),
            linear2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// # Shapes
    ///   - Images [batch_size, height, width, channels]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _height, _width, _channels] = images.dims();

        // NHWC -> NCHW
        let x = images.swap_dims(1, 3).swap_dims(2, 3);

        let x = self.conv1.forward(x); // [batch_size, 8, _, _]
        let x = self.dropout.forward(x);
        let x = self.conv2.forward(x); // [batch_size, 16, _, _]
        let x = self.dropout.forward(x);
        let x = self.activation.forward(x);

        let x = self.pool.forward(x); // [batch_size, 16, 8, 8]
        let x = x.reshape([batch_size, CONV_CHANNELS[2] * POOL_SIZE * POOL_SIZE]);
        let x = self.linear1.forward(x);
        let x = self.dropout.forward(x);
        let x = self.activation.forward(x);

        self.linear2.forward(x) // [batch_size, num_classes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn forward_maps_digit_batch_to_class_scores() {
        let device = Default::default();
        let model = ModelConfig::new()
            .with_hidden_size(32)
            .init::<TestBackend>(&device);

        let output = model.forward(Tensor::zeros([2, 28, 28, 1], &device));

        assert_eq!(output.dims(), [2, 10]);
    }

    #[test]
    fn num_classes_sets_output_width() {
        let device = Default::default();
        let model = ModelConfig::new()
            .with_hidden_size(16)
            .with_num_classes(4)
            .init::<TestBackend>(&device);

        let output = model.forward(Tensor::ones([1, 28, 28, 1], &device));

        assert_eq!(output.dims(), [1, 4]);
    }
}
